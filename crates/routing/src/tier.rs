use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Classification outcome for one inbound message. Mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// From the privileged identity.
    Priority,
    Agent,
    Conversational,
    /// The bot is addressed directly (handle, or a reply in monitored mode).
    DirectMention,
    /// The bot is referenced by name without being addressed.
    GeneralMention,
    BackgroundLog,
    /// Silently dropped; never delivered or stored.
    Junk,
    Unclassified,
}

impl Tier {
    pub const ALL: [Tier; 8] = [
        Tier::Priority,
        Tier::Agent,
        Tier::Conversational,
        Tier::DirectMention,
        Tier::GeneralMention,
        Tier::BackgroundLog,
        Tier::Junk,
        Tier::Unclassified,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Agent => "agent",
            Self::Conversational => "conversational",
            Self::DirectMention => "direct_mention",
            Self::GeneralMention => "general_mention",
            Self::BackgroundLog => "background_log",
            Self::Junk => "junk",
            Self::Unclassified => "unclassified",
        }
    }

    /// The toggle gating this tier, if any.
    #[must_use]
    pub fn toggle(self) -> Option<Toggle> {
        match self {
            Self::Priority => Some(Toggle::Priority),
            Self::Agent => Some(Toggle::Agent),
            Self::Conversational => Some(Toggle::Conversational),
            Self::DirectMention | Self::GeneralMention => Some(Toggle::Mention),
            Self::BackgroundLog => Some(Toggle::Logging),
            Self::Junk | Self::Unclassified => None,
        }
    }

    /// Whether messages of this tier target an outbound workflow.
    #[must_use]
    pub fn is_deliverable(self) -> bool {
        !matches!(self, Self::Junk | Self::Unclassified)
    }

    /// Whether bursts of this tier are coalesced before delivery.
    #[must_use]
    pub fn is_burst_coalesced(self) -> bool {
        matches!(self, Self::DirectMention | Self::GeneralMention)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| Error::UnknownTier(s.to_string()))
    }
}

/// Process-wide feature switch. One toggle may gate several tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
    Priority,
    Agent,
    Conversational,
    Mention,
    Logging,
}

impl Toggle {
    pub const ALL: [Toggle; 5] = [
        Toggle::Priority,
        Toggle::Agent,
        Toggle::Conversational,
        Toggle::Mention,
        Toggle::Logging,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Agent => "agent",
            Self::Conversational => "conversational",
            Self::Mention => "mention",
            Self::Logging => "logging",
        }
    }

    /// Protected toggles cannot be flipped by the ordinary enable/disable path.
    #[must_use]
    pub fn is_protected(self) -> bool {
        matches!(self, Self::Priority)
    }

    /// Scope-required toggles are inactive in every chat until at least one
    /// chat is added to their scope. Other toggles treat an empty scope as
    /// "all chats".
    #[must_use]
    pub fn requires_scope(self) -> bool {
        matches!(self, Self::Agent | Self::Conversational)
    }

    /// Whether the toggle can be narrowed to a chat set at all.
    #[must_use]
    pub fn supports_scope(self) -> bool {
        !self.is_protected()
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Toggle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|toggle| toggle.as_str() == s)
            .ok_or_else(|| Error::UnknownToggle(s.to_string()))
    }
}
