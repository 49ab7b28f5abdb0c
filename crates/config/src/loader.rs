use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::CourierConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "courier.toml",
    "courier.yaml",
    "courier.yml",
    "courier.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./courier.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/courier/courier.{toml,yaml,yml,json}` (user-global)
///
/// Returns `CourierConfig::default()` if no config file is found or the file
/// fails to parse.
pub fn discover_and_load() -> CourierConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    CourierConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/courier/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "courier").map(|d| d.config_dir().to_path_buf())
}

/// Apply `COURIER_*` environment overrides on top of a loaded config.
///
/// Recognised: `COURIER_TELEGRAM_TOKEN`, `COURIER_BIND`, `COURIER_PORT`,
/// `COURIER_PRIVILEGED_SENDER_ID`.
pub fn apply_env_overrides(config: CourierConfig) -> CourierConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: CourierConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> CourierConfig {
    if let Some(token) = lookup("COURIER_TELEGRAM_TOKEN") {
        config.telegram.token = Secret::new(token);
    }
    if let Some(bind) = lookup("COURIER_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("COURIER_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid COURIER_PORT"),
        }
    }
    if let Some(id) = lookup("COURIER_PRIVILEGED_SENDER_ID") {
        match id.parse() {
            Ok(id) => config.routing.privileged_sender_id = Some(id),
            Err(e) => {
                warn!(value = %id, error = %e, "ignoring invalid COURIER_PRIVILEGED_SENDER_ID")
            },
        }
    }
    config
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CourierConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::io::Write};

    fn write_temp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_toml_file() {
        let file = write_temp(".toml", "[server]\nport = 9000\n");
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[test]
    fn loads_yaml_file() {
        let file = write_temp(
            ".yaml",
            "routing:\n  bot_handle: helper_bot\n  agent_chats: [1, 2]\n",
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.routing.bot_handle, "helper_bot");
        assert_eq!(cfg.routing.agent_chats, vec![1, 2]);
    }

    #[test]
    fn loads_json_file() {
        let file = write_temp(".json", r#"{"delivery": {"timeout_secs": 3}}"#);
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.delivery.timeout_secs, 3);
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = write_temp(".ini", "port=1");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Path::new("/definitely/not/here/courier.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn env_overrides_apply() {
        let lookup = |name: &str| match name {
            "COURIER_TELEGRAM_TOKEN" => Some("999:XYZ".to_string()),
            "COURIER_PORT" => Some("9100".to_string()),
            "COURIER_PRIVILEGED_SENDER_ID" => Some("not-a-number".to_string()),
            _ => None,
        };
        let cfg = apply_env_overrides_with(CourierConfig::default(), lookup);
        assert_eq!(cfg.telegram.token.expose_secret(), "999:XYZ");
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.routing.privileged_sender_id, None);
    }
}
