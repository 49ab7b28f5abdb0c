use {anyhow::Result, clap::Subcommand, secrecy::Secret};

use courier_config::{CourierConfig, Severity, validate};

#[derive(Subcommand, Default, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    #[default]
    Show,
    /// Validate the configuration and report errors/warnings.
    Check,
}

pub fn handle_config(action: ConfigAction, config: &CourierConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", render_redacted(config)?);
            Ok(())
        },
        ConfigAction::Check => check(config),
    }
}

const REDACTED: &str = "[REDACTED]";

/// Serialize `config` with the bot token replaced by a placeholder.
pub fn render_redacted(config: &CourierConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.telegram.has_token() {
        shown.telegram.token = Secret::new(REDACTED.to_string());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: &CourierConfig) -> Result<()> {
    let result = validate(config);

    for d in &result.diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
    }

    if result.diagnostics.is_empty() {
        eprintln!("No issues found.");
    }
    if result.has_errors() {
        anyhow::bail!("configuration has errors");
    }
    Ok(())
}
