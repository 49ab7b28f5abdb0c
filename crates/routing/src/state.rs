use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, RwLock},
};

use {
    courier_config::{ClassifierMode, RoutingConfig},
    serde::Serialize,
};

use crate::{
    tier::Toggle,
    toggles::{FeatureToggleSet, ToggleState},
};

/// Shared, runtime-mutable routing state.
///
/// std `RwLock` because every access is a short synchronous read or write
/// that is never held across an `.await`.
pub type SharedRoutingState = Arc<RwLock<RoutingState>>;

/// Everything the classifier reads that administrators can change at runtime.
#[derive(Debug, Clone, Default)]
pub struct RoutingState {
    pub toggles: FeatureToggleSet,
    privileged_sender: Option<i64>,
    blocked_senders: BTreeSet<i64>,
    blocked_chats: BTreeSet<i64>,
    allowed_groups: BTreeSet<i64>,
}

/// Serializable dump of the current rule configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RulesExport {
    pub mode: ClassifierMode,
    pub privileged_sender_id: Option<i64>,
    pub toggles: BTreeMap<Toggle, ToggleState>,
    pub blocked_senders: Vec<i64>,
    pub blocked_chats: Vec<i64>,
    pub allowed_groups: Vec<i64>,
    pub rules: Vec<crate::rules::RoutingRule>,
}

impl RoutingState {
    #[must_use]
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            toggles: FeatureToggleSet::from_defaults(
                &config.toggles,
                &config.agent_chats,
                &config.conversational_chats,
            ),
            privileged_sender: config.privileged_sender_id,
            blocked_senders: config.blocked_senders.iter().copied().collect(),
            blocked_chats: config.blocked_chats.iter().copied().collect(),
            allowed_groups: config.allowed_groups.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn into_shared(self) -> SharedRoutingState {
        Arc::new(RwLock::new(self))
    }

    #[must_use]
    pub fn privileged_sender(&self) -> Option<i64> {
        self.privileged_sender
    }

    #[must_use]
    pub fn is_privileged(&self, sender_id: i64) -> bool {
        self.privileged_sender == Some(sender_id)
    }

    #[must_use]
    pub fn is_blocked(&self, sender_id: i64, chat_id: i64) -> bool {
        self.blocked_senders.contains(&sender_id) || self.blocked_chats.contains(&chat_id)
    }

    #[must_use]
    pub fn is_allowed_group(&self, chat_id: i64) -> bool {
        self.allowed_groups.contains(&chat_id)
    }

    /// Replace the privileged identity, returning the previous one.
    pub fn rotate_privileged(&mut self, sender_id: Option<i64>) -> Option<i64> {
        std::mem::replace(&mut self.privileged_sender, sender_id)
    }

    /// Returns whether the blocklist changed.
    pub fn set_sender_blocked(&mut self, sender_id: i64, blocked: bool) -> bool {
        if blocked {
            self.blocked_senders.insert(sender_id)
        } else {
            self.blocked_senders.remove(&sender_id)
        }
    }

    /// Returns whether the blocklist changed.
    pub fn set_chat_blocked(&mut self, chat_id: i64, blocked: bool) -> bool {
        if blocked {
            self.blocked_chats.insert(chat_id)
        } else {
            self.blocked_chats.remove(&chat_id)
        }
    }

    /// Returns whether the allowed-group set changed.
    pub fn set_group_allowed(&mut self, chat_id: i64, allowed: bool) -> bool {
        if allowed {
            self.allowed_groups.insert(chat_id)
        } else {
            self.allowed_groups.remove(&chat_id)
        }
    }

    /// Emergency reset: toggles back to safe defaults with every scope
    /// cleared. Identities and lists are left alone.
    pub fn reset_toggles(&mut self) {
        self.toggles = FeatureToggleSet::safe_defaults();
    }

    #[must_use]
    pub fn blocked_senders(&self) -> Vec<i64> {
        self.blocked_senders.iter().copied().collect()
    }

    #[must_use]
    pub fn blocked_chats(&self) -> Vec<i64> {
        self.blocked_chats.iter().copied().collect()
    }

    #[must_use]
    pub fn allowed_groups(&self) -> Vec<i64> {
        self.allowed_groups.iter().copied().collect()
    }
}
