//! Semantic checks on a parsed config, run once at startup.

use serde::Serialize;

use crate::schema::CourierConfig;

/// Tier tags accepted as keys of `delivery.endpoints`.
pub const ENDPOINT_TIERS: &[&str] = &[
    "priority",
    "agent",
    "conversational",
    "direct_mention",
    "general_mention",
    "background_log",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "delivery.endpoints.priority"
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate a parsed config.
#[must_use]
pub fn validate(config: &CourierConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (tier, url) in &config.delivery.endpoints {
        let path = format!("delivery.endpoints.{tier}");
        if !ENDPOINT_TIERS.contains(&tier.as_str()) {
            result.push(
                Severity::Error,
                &path,
                format!("unknown tier \"{tier}\" (expected one of {ENDPOINT_TIERS:?})"),
            );
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            result.push(Severity::Error, &path, format!("not an http(s) URL: {url}"));
        }
    }

    if config.delivery.endpoints.is_empty() {
        result.push(
            Severity::Warning,
            "delivery.endpoints",
            "no workflow endpoints configured; every classified message will fall back",
        );
    }
    if config.delivery.timeout_secs == 0 {
        result.push(Severity::Error, "delivery.timeout_secs", "must be > 0");
    }
    if config.coalescing.direct_mention_window_secs == 0 {
        result.push(
            Severity::Error,
            "coalescing.direct_mention_window_secs",
            "must be > 0",
        );
    }
    if config.coalescing.general_mention_window_secs == 0 {
        result.push(
            Severity::Error,
            "coalescing.general_mention_window_secs",
            "must be > 0",
        );
    }
    if config.routing.privileged_sender_id.is_none() {
        result.push(
            Severity::Warning,
            "routing.privileged_sender_id",
            "no privileged identity set; the priority tier can never match",
        );
    }
    if config.routing.bot_handle.trim().is_empty() {
        result.push(
            Severity::Warning,
            "routing.bot_handle",
            "empty bot handle disables direct-mention detection",
        );
    }
    if !is_loopback(&config.server.bind) {
        result.push(
            Severity::Warning,
            "server.bind",
            format!(
                "{} is not a loopback address; /send and /api/admin have no authentication",
                config.server.bind
            ),
        );
    }
    if config.telegram.inbound_buffer == 0 {
        result.push(Severity::Error, "telegram.inbound_buffer", "must be > 0");
    }

    result
}

fn is_loopback(bind: &str) -> bool {
    let host = bind.trim().trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}
