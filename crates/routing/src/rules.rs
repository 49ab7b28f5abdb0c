//! Data-driven rule table: an ordered list of `{tier, predicate, keywords}`.

use {
    courier_config::{ClassifierMode, RoutingConfig},
    serde::Serialize,
};

use crate::{
    message::CanonicalMessage,
    state::RoutingState,
    tier::{Tier, Toggle},
};

/// Case-insensitive keyword matcher.
///
/// Keywords match on word boundaries where the keyword itself starts or ends
/// with a word character, so `"hi"` matches `"hi there"` but not `"this"`,
/// while `"?"` matches anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeywordSet {
    keywords: Vec<String>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// First keyword found in `text`, if any.
    #[must_use]
    pub fn find_in(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| contains_bounded(&haystack, k))
            .map(String::as_str)
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.find_in(text).is_some()
    }
}

fn contains_bounded(haystack: &str, needle: &str) -> bool {
    let check_start = needle.chars().next().is_some_and(is_word_char);
    let check_end = needle.chars().next_back().is_some_and(is_word_char);

    haystack.match_indices(needle).any(|(idx, _)| {
        let before_ok =
            !check_start || !haystack[..idx].chars().next_back().is_some_and(is_word_char);
        let after_ok = !check_end
            || !haystack[idx + needle.len()..]
                .chars()
                .next()
                .is_some_and(is_word_char);
        before_ok && after_ok
    })
}

/// Activation condition of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Blocklisted sender or chat, spam keyword, or too-short group text.
    Junk { min_group_text_len: usize },
    /// Sender is the privileged identity.
    PrivilegedSender,
    /// Toggle active for the chat and (keyword match or text longer than
    /// `long_text_threshold` characters, when set).
    ScopedKeywords {
        toggle: Toggle,
        long_text_threshold: Option<usize>,
    },
    /// Bot handle addressed; in monitored mode any reply also counts.
    DirectAddress { replies_count: bool },
    /// Bot referenced by name.
    NameReference,
    /// Private from a non-privileged sender, or any group or channel message.
    Background,
}

/// One entry of the classifier. Rank is its position in the table.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingRule {
    pub tier: Tier,
    pub description: String,
    pub keywords: KeywordSet,
    pub predicate: Predicate,
}

impl RoutingRule {
    /// Evaluate this rule against a message under the current routing state.
    #[must_use]
    pub fn matches(&self, msg: &CanonicalMessage, state: &RoutingState) -> bool {
        let toggles = &state.toggles;
        match &self.predicate {
            Predicate::Junk { min_group_text_len } => {
                // A privileged sender with priority on is never junk.
                if state.is_privileged(msg.sender_id) && toggles.is_enabled(Toggle::Priority) {
                    return false;
                }
                state.is_blocked(msg.sender_id, msg.chat_id)
                    || self.keywords.matches(&msg.text)
                    || (msg.is_group && msg.text.trim().chars().count() < *min_group_text_len)
            },
            Predicate::PrivilegedSender => {
                toggles.is_enabled(Toggle::Priority) && state.is_privileged(msg.sender_id)
            },
            Predicate::ScopedKeywords {
                toggle,
                long_text_threshold,
            } => {
                toggles.is_active(*toggle, msg.chat_id)
                    && (self.keywords.matches(&msg.text)
                        || long_text_threshold.is_some_and(|n| msg.text.chars().count() > n))
            },
            Predicate::DirectAddress { replies_count } => {
                toggles.is_active(Toggle::Mention, msg.chat_id)
                    && (self.keywords.matches(&msg.text)
                        // Any reply counts, not just replies to the bot's own
                        // messages: the transport does not expose reply authors.
                        || (*replies_count && msg.reply_to_message_id.is_some()))
            },
            Predicate::NameReference => {
                toggles.is_active(Toggle::Mention, msg.chat_id) && self.keywords.matches(&msg.text)
            },
            Predicate::Background => {
                toggles.is_active(Toggle::Logging, msg.chat_id)
                    && ((msg.is_private && !state.is_privileged(msg.sender_id))
                        || msg.is_group
                        || msg.is_channel)
            },
        }
    }
}

/// Ordered rule list. Evaluation order is fixed; first match wins.
#[derive(Debug, Clone, Serialize)]
pub struct RuleTable {
    rules: Vec<RoutingRule>,
}

impl RuleTable {
    #[must_use]
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// Build the standard table for the configured classifier mode.
    #[must_use]
    pub fn from_config(config: &RoutingConfig) -> Self {
        let monitored = config.mode == ClassifierMode::MonitoredGroups;
        let handle = config.bot_handle.trim().trim_start_matches('@');
        let handle_patterns = if handle.is_empty() {
            KeywordSet::default()
        } else {
            KeywordSet::new([format!("@{handle}")])
        };

        let mut rules = vec![
            RoutingRule {
                tier: Tier::Junk,
                description: "blocklisted, spam keyword, or too-short group message".into(),
                keywords: KeywordSet::new(&config.spam_keywords),
                predicate: Predicate::Junk {
                    min_group_text_len: config.min_group_text_len,
                },
            },
            RoutingRule {
                tier: Tier::Priority,
                description: "sent by the privileged identity".into(),
                keywords: KeywordSet::default(),
                predicate: Predicate::PrivilegedSender,
            },
            RoutingRule {
                tier: Tier::Agent,
                description: "agent-scoped chat with an intent keyword or long text".into(),
                keywords: KeywordSet::new(&config.agent_keywords),
                predicate: Predicate::ScopedKeywords {
                    toggle: Toggle::Agent,
                    long_text_threshold: Some(config.agent_long_text_threshold),
                },
            },
            RoutingRule {
                tier: Tier::Conversational,
                description: "conversational-scoped chat with a greeting or question".into(),
                keywords: KeywordSet::new(
                    config
                        .greeting_keywords
                        .iter()
                        .chain(&config.question_markers),
                ),
                predicate: Predicate::ScopedKeywords {
                    toggle: Toggle::Conversational,
                    long_text_threshold: None,
                },
            },
            RoutingRule {
                tier: Tier::DirectMention,
                description: if monitored {
                    "bot handle addressed or message is a reply".into()
                } else {
                    "bot handle addressed".into()
                },
                keywords: handle_patterns,
                predicate: Predicate::DirectAddress {
                    replies_count: monitored,
                },
            },
        ];

        if monitored {
            rules.push(RoutingRule {
                tier: Tier::GeneralMention,
                description: "bot referenced by name without direct address".into(),
                keywords: KeywordSet::new(&config.bot_name_keywords),
                predicate: Predicate::NameReference,
            });
        }

        rules.push(RoutingRule {
            tier: Tier::BackgroundLog,
            description: "private, group, or channel traffic".into(),
            keywords: KeywordSet::default(),
            predicate: Predicate::Background,
        });

        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// First matching tier, or `None` when no rule matches.
    #[must_use]
    pub fn first_match(&self, msg: &CanonicalMessage, state: &RoutingState) -> Option<Tier> {
        self.rules
            .iter()
            .find(|rule| rule.matches(msg, state))
            .map(|rule| rule.tier)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("hi there", true)]
    #[case("Hi!", true)]
    #[case("this is it", false)]
    #[case("say hello", true)]
    #[case("chillin", false)]
    fn greeting_words_match_on_boundaries(#[case] text: &str, #[case] expected: bool) {
        let set = KeywordSet::new(["hi", "hello"]);
        assert_eq!(set.matches(text), expected, "{text}");
    }

    #[rstest]
    #[case("what time is it?", true)]
    #[case("no question here", false)]
    fn punctuation_keywords_match_anywhere(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(KeywordSet::new(["?"]).matches(text), expected);
    }

    #[test]
    fn phrases_match_case_insensitively() {
        let set = KeywordSet::new(["Help Me"]);
        assert_eq!(set.find_in("could you HELP ME out"), Some("help me"));
    }

    #[test]
    fn handle_does_not_match_longer_handle() {
        let set = KeywordSet::new(["@satya"]);
        assert!(set.matches("ping @satya please"));
        assert!(!set.matches("ping @satya_fan please"));
    }

    #[test]
    fn broad_table_order_and_no_general_mention() {
        let table = RuleTable::from_config(&RoutingConfig::default());
        let tiers: Vec<_> = table.rules().iter().map(|r| r.tier).collect();
        assert_eq!(tiers, vec![
            Tier::Junk,
            Tier::Priority,
            Tier::Agent,
            Tier::Conversational,
            Tier::DirectMention,
            Tier::BackgroundLog,
        ]);
    }

    #[test]
    fn monitored_table_checks_direct_before_general() {
        let config = RoutingConfig {
            mode: ClassifierMode::MonitoredGroups,
            ..Default::default()
        };
        let table = RuleTable::from_config(&config);
        let tiers: Vec<_> = table.rules().iter().map(|r| r.tier).collect();
        let direct = tiers.iter().position(|t| *t == Tier::DirectMention);
        let general = tiers.iter().position(|t| *t == Tier::GeneralMention);
        assert!(direct < general);
    }
}
