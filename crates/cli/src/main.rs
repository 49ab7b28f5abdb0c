mod classify_commands;
mod config_commands;
mod serve;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    courier_config::CourierConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier: chat message router")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and ~/.config/courier/).
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router (default when no subcommand is provided).
    Serve,
    /// Print the effective configuration with secrets redacted.
    Config {
        #[command(subcommand)]
        action: Option<config_commands::ConfigAction>,
    },
    /// Classify a single message offline against the configured rules.
    Classify(classify_commands::ClassifyArgs),
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the config file (explicit path or discovery), then apply
/// `COURIER_*` environment overrides.
fn load_config(cli: &Cli) -> anyhow::Result<CourierConfig> {
    let config = match cli.config {
        Some(ref path) => courier_config::load_config(path)?,
        None => courier_config::discover_and_load(),
    };
    Ok(courier_config::apply_env_overrides(config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "courier starting");
            serve::run(config).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action.unwrap_or_default(), &config)
        },
        Some(Commands::Classify(args)) => classify_commands::handle_classify(&args, &config),
    }
}
