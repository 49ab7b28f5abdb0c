//! Normalize inbound chat events and classify them into delivery tiers.
//!
//! Evaluation order (first match wins):
//! 1. Junk (blocklists, spam keywords, too-short group text), dropped silently
//! 2. Priority (privileged sender, protected toggle)
//! 3. Agent (scoped chats, intent keywords or long text)
//! 4. Conversational (scoped chats, greetings or questions)
//! 5. Direct mention, then general mention (monitored-group mode only)
//! 6. Background log (catch-all for private, group, and channel traffic)
//! 7. Unclassified

pub mod classify;
pub mod error;
pub mod message;
pub mod rules;
pub mod state;
pub mod tier;
pub mod toggles;

pub use {
    classify::Classifier,
    error::{Error, Result},
    message::{CanonicalMessage, normalize},
    rules::{KeywordSet, Predicate, RoutingRule, RuleTable},
    state::{RoutingState, RulesExport, SharedRoutingState},
    tier::{Tier, Toggle},
    toggles::{FeatureToggleSet, ToggleState},
};
