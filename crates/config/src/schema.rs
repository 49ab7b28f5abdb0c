//! Config schema types for the router, its transport, and its outputs.

use std::{collections::BTreeMap, path::PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub routing: RoutingConfig,
    pub coalescing: CoalescingConfig,
    pub delivery: DeliveryConfig,
    pub fallback: FallbackConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

/// Telegram transport configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Overrides the username reported by `getMe` (used for @mention checks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_username: Option<String>,

    /// Long-polling timeout passed to `getUpdates`.
    pub poll_timeout_secs: u32,

    /// Capacity of the inbound event stream between transport and pipeline.
    pub inbound_buffer: usize,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("bot_username", &self.bot_username)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            bot_username: None,
            poll_timeout_secs: 30,
            inbound_buffer: 256,
        }
    }
}

impl TelegramConfig {
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

/// Which classifier variant to run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    /// Every chat the account can see is classified.
    #[default]
    Broad,
    /// Only the allowed groups (and the privileged sender anywhere) are
    /// classified; mentions split into direct and general.
    MonitoredGroups,
}

/// Initial state of the per-tier feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToggleDefaults {
    pub priority: bool,
    pub agent: bool,
    pub conversational: bool,
    pub mention: bool,
    pub logging: bool,
}

impl Default for ToggleDefaults {
    fn default() -> Self {
        Self {
            priority: true,
            agent: false,
            conversational: false,
            mention: false,
            logging: true,
        }
    }
}

/// Classification rules and the identities they refer to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub mode: ClassifierMode,
    /// The single sender whose messages always classify as priority.
    pub privileged_sender_id: Option<i64>,
    /// Bot handle without the leading `@`.
    pub bot_handle: String,
    /// Words that reference the bot by name without addressing it directly.
    pub bot_name_keywords: Vec<String>,
    pub blocked_senders: Vec<i64>,
    pub blocked_chats: Vec<i64>,
    /// Conversations watched in `monitored_groups` mode.
    pub allowed_groups: Vec<i64>,
    /// Chats the agent tier is scoped to.
    pub agent_chats: Vec<i64>,
    /// Chats the conversational tier is scoped to.
    pub conversational_chats: Vec<i64>,
    pub spam_keywords: Vec<String>,
    pub agent_keywords: Vec<String>,
    pub greeting_keywords: Vec<String>,
    pub question_markers: Vec<String>,
    /// Group messages shorter than this (after trimming) are junk.
    pub min_group_text_len: usize,
    /// Texts longer than this many characters qualify for the agent tier.
    pub agent_long_text_threshold: usize,
    pub toggles: ToggleDefaults,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::default(),
            privileged_sender_id: None,
            bot_handle: "satya".into(),
            bot_name_keywords: strings(&["satya"]),
            blocked_senders: Vec::new(),
            blocked_chats: Vec::new(),
            allowed_groups: Vec::new(),
            agent_chats: Vec::new(),
            conversational_chats: Vec::new(),
            spam_keywords: strings(&[
                "free money",
                "crypto giveaway",
                "airdrop",
                "click here",
                "double your",
                "investment opportunity",
                "t.me/joinchat",
            ]),
            agent_keywords: strings(&[
                "help me",
                "can you",
                "build",
                "create",
                "analyze",
                "generate",
                "research",
                "summarize",
                "automate",
            ]),
            greeting_keywords: strings(&[
                "hi",
                "hello",
                "hey",
                "good morning",
                "good evening",
                "thanks",
                "thank you",
            ]),
            question_markers: strings(&["?"]),
            min_group_text_len: 3,
            agent_long_text_threshold: 100,
            toggles: ToggleDefaults::default(),
        }
    }
}

/// Burst-coalescing windows, one per mention kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoalescingConfig {
    pub direct_mention_window_secs: u64,
    pub general_mention_window_secs: u64,
}

impl Default for CoalescingConfig {
    fn default() -> Self {
        Self {
            direct_mention_window_secs: 10,
            general_mention_window_secs: 30,
        }
    }
}

/// Outbound workflow endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Per-request timeout for a workflow POST.
    pub timeout_secs: u64,
    /// Tier tag (e.g. `"priority"`, `"direct_mention"`) → webhook URL.
    pub endpoints: BTreeMap<String, String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            endpoints: BTreeMap::new(),
        }
    }
}

/// Local durable sink for undeliverable and audited messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub database_url: String,
    /// Append-only JSONL file used when the database write itself fails.
    pub last_resort_path: PathBuf,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://courier.db?mode=rwc".into(),
            last_resort_path: PathBuf::from("courier-fallback.jsonl"),
        }
    }
}
