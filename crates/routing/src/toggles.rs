use std::collections::{BTreeMap, BTreeSet};

use {courier_config::ToggleDefaults, serde::Serialize};

use crate::{Error, Result, tier::Toggle};

/// Enabled flag plus the chats a toggle is narrowed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToggleState {
    pub enabled: bool,
    pub scope: BTreeSet<i64>,
}

/// Process-wide runtime switches read by the classifier on every message.
///
/// Mutated only through explicit administrative operations. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureToggleSet {
    states: BTreeMap<Toggle, ToggleState>,
}

impl Default for FeatureToggleSet {
    fn default() -> Self {
        Self::safe_defaults()
    }
}

impl FeatureToggleSet {
    /// `Priority` and `Logging` on, everything else off, no scopes.
    #[must_use]
    pub fn safe_defaults() -> Self {
        let states = Toggle::ALL
            .into_iter()
            .map(|toggle| {
                let enabled = matches!(toggle, Toggle::Priority | Toggle::Logging);
                (toggle, ToggleState {
                    enabled,
                    scope: BTreeSet::new(),
                })
            })
            .collect();
        Self { states }
    }

    /// Build from configured defaults and the initial agent/conversational scopes.
    #[must_use]
    pub fn from_defaults(
        defaults: &ToggleDefaults,
        agent_chats: &[i64],
        conversational_chats: &[i64],
    ) -> Self {
        let mut set = Self::safe_defaults();
        set.state_mut(Toggle::Priority).enabled = defaults.priority;
        set.state_mut(Toggle::Agent).enabled = defaults.agent;
        set.state_mut(Toggle::Conversational).enabled = defaults.conversational;
        set.state_mut(Toggle::Mention).enabled = defaults.mention;
        set.state_mut(Toggle::Logging).enabled = defaults.logging;
        set.state_mut(Toggle::Agent)
            .scope
            .extend(agent_chats.iter().copied());
        set.state_mut(Toggle::Conversational)
            .scope
            .extend(conversational_chats.iter().copied());
        set
    }

    fn state_mut(&mut self, toggle: Toggle) -> &mut ToggleState {
        self.states.entry(toggle).or_default()
    }

    #[must_use]
    pub fn state(&self, toggle: Toggle) -> ToggleState {
        self.states.get(&toggle).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn is_enabled(&self, toggle: Toggle) -> bool {
        self.states.get(&toggle).is_some_and(|s| s.enabled)
    }

    /// Whether the toggle is on for messages in `chat_id`.
    #[must_use]
    pub fn is_active(&self, toggle: Toggle, chat_id: i64) -> bool {
        let Some(state) = self.states.get(&toggle) else {
            return false;
        };
        if !state.enabled {
            return false;
        }
        if state.scope.is_empty() {
            !toggle.requires_scope()
        } else {
            state.scope.contains(&chat_id)
        }
    }

    /// Enable or disable an ordinary toggle globally. Returns whether it changed.
    pub fn set_enabled(&mut self, toggle: Toggle, enabled: bool) -> Result<bool> {
        if toggle.is_protected() {
            return Err(Error::ProtectedToggle(toggle));
        }
        let state = self.state_mut(toggle);
        let changed = state.enabled != enabled;
        state.enabled = enabled;
        Ok(changed)
    }

    /// The only path that flips the protected `Priority` toggle.
    pub fn set_priority_enabled(&mut self, enabled: bool) -> bool {
        let state = self.state_mut(Toggle::Priority);
        let changed = state.enabled != enabled;
        state.enabled = enabled;
        changed
    }

    /// Enable a toggle for one chat: turns it on and adds the chat to its scope.
    pub fn enable_for_chat(&mut self, toggle: Toggle, chat_id: i64) -> Result<bool> {
        if !toggle.supports_scope() {
            return Err(Error::ProtectedToggle(toggle));
        }
        let state = self.state_mut(toggle);
        let changed = !state.enabled || !state.scope.contains(&chat_id);
        state.enabled = true;
        state.scope.insert(chat_id);
        Ok(changed)
    }

    /// Remove one chat from a toggle's scope.
    ///
    /// Removing the last chat of a scope-optional toggle widens it back to
    /// every chat, so that case disables the toggle instead.
    pub fn disable_for_chat(&mut self, toggle: Toggle, chat_id: i64) -> Result<bool> {
        if !toggle.supports_scope() {
            return Err(Error::ProtectedToggle(toggle));
        }
        let state = self.state_mut(toggle);
        if !state.scope.remove(&chat_id) {
            return Ok(false);
        }
        if state.scope.is_empty() && !toggle.requires_scope() {
            state.enabled = false;
        }
        Ok(true)
    }

    /// Snapshot of every toggle, in evaluation order.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Toggle, ToggleState> {
        self.states.clone()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_defaults_enable_priority_and_logging_only() {
        let set = FeatureToggleSet::safe_defaults();
        for toggle in Toggle::ALL {
            let expected = matches!(toggle, Toggle::Priority | Toggle::Logging);
            assert_eq!(set.is_enabled(toggle), expected, "{toggle}");
        }
    }

    #[test]
    fn protected_toggle_rejects_ordinary_path() {
        let mut set = FeatureToggleSet::safe_defaults();
        assert!(matches!(
            set.set_enabled(Toggle::Priority, false),
            Err(Error::ProtectedToggle(Toggle::Priority))
        ));
        assert!(set.is_enabled(Toggle::Priority));
        assert!(set.set_priority_enabled(false));
        assert!(!set.is_enabled(Toggle::Priority));
    }

    #[test]
    fn scope_required_toggle_is_inactive_without_scope() {
        let mut set = FeatureToggleSet::safe_defaults();
        set.set_enabled(Toggle::Agent, true).unwrap();
        assert!(!set.is_active(Toggle::Agent, 10));
        set.enable_for_chat(Toggle::Agent, 10).unwrap();
        assert!(set.is_active(Toggle::Agent, 10));
        assert!(!set.is_active(Toggle::Agent, 11));
    }

    #[test]
    fn empty_scope_means_every_chat_for_optional_toggles() {
        let mut set = FeatureToggleSet::safe_defaults();
        assert!(set.is_active(Toggle::Logging, 1));
        assert!(set.is_active(Toggle::Logging, -100));
        set.enable_for_chat(Toggle::Logging, 1).unwrap();
        assert!(set.is_active(Toggle::Logging, 1));
        assert!(!set.is_active(Toggle::Logging, -100));
    }

    #[test]
    fn global_disable_wins_over_scope() {
        let mut set = FeatureToggleSet::safe_defaults();
        set.enable_for_chat(Toggle::Mention, 5).unwrap();
        assert!(set.is_active(Toggle::Mention, 5));
        set.set_enabled(Toggle::Mention, false).unwrap();
        assert!(!set.is_active(Toggle::Mention, 5));
    }

    #[test]
    fn removing_last_scoped_chat_disables_optional_toggle() {
        let mut set = FeatureToggleSet::safe_defaults();
        set.enable_for_chat(Toggle::Mention, 5).unwrap();
        assert!(set.disable_for_chat(Toggle::Mention, 5).unwrap());
        assert!(!set.is_enabled(Toggle::Mention));
        assert!(!set.disable_for_chat(Toggle::Mention, 5).unwrap());
    }

    #[test]
    fn from_defaults_seeds_scopes() {
        let defaults = ToggleDefaults {
            agent: true,
            ..Default::default()
        };
        let set = FeatureToggleSet::from_defaults(&defaults, &[7], &[]);
        assert!(set.is_active(Toggle::Agent, 7));
        assert!(!set.is_active(Toggle::Conversational, 7));
    }
}
