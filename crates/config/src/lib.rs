//! Configuration loading, validation, and env substitution.
//!
//! Config files: `courier.toml`, `courier.yaml`, or `courier.json`
//! Searched in `./` then `~/.config/courier/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        ClassifierMode, CoalescingConfig, CourierConfig, DeliveryConfig, FallbackConfig,
        RoutingConfig, ServerConfig, TelegramConfig, ToggleDefaults,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
