use {
    courier_config::{ClassifierMode, RoutingConfig},
    tracing::trace,
};

use crate::{
    message::CanonicalMessage,
    rules::RuleTable,
    state::{RoutingState, RulesExport},
    tier::Tier,
};

/// Evaluates a canonical message against the rule table.
#[derive(Debug, Clone)]
pub struct Classifier {
    mode: ClassifierMode,
    table: RuleTable,
}

impl Classifier {
    #[must_use]
    pub fn new(mode: ClassifierMode, table: RuleTable) -> Self {
        Self { mode, table }
    }

    #[must_use]
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self::new(config.mode, RuleTable::from_config(config))
    }

    #[must_use]
    pub fn mode(&self) -> ClassifierMode {
        self.mode
    }

    #[must_use]
    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Classify one message. Pure function of the message and `state`.
    #[must_use]
    pub fn classify(&self, msg: &CanonicalMessage, state: &RoutingState) -> Tier {
        if self.mode == ClassifierMode::MonitoredGroups
            && !state.is_allowed_group(msg.chat_id)
            && !state.is_privileged(msg.sender_id)
        {
            trace!(chat_id = msg.chat_id, "chat not monitored");
            return Tier::Unclassified;
        }

        let tier = self
            .table
            .first_match(msg, state)
            .unwrap_or(Tier::Unclassified);
        trace!(chat_id = msg.chat_id, sender_id = msg.sender_id, %tier, "classified");
        tier
    }

    /// Dump the current rule configuration for operators.
    #[must_use]
    pub fn export(&self, state: &RoutingState) -> RulesExport {
        RulesExport {
            mode: self.mode,
            privileged_sender_id: state.privileged_sender(),
            toggles: state.toggles.snapshot(),
            blocked_senders: state.blocked_senders(),
            blocked_chats: state.blocked_chats(),
            allowed_groups: state.allowed_groups(),
            rules: self.table.rules().to_vec(),
        }
    }
}
