//! JSON body POSTed to workflow endpoints.

use {
    chrono::{DateTime, Utc},
    courier_routing::{CanonicalMessage, Tier},
    serde::Serialize,
};

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowPayload {
    pub workflow_type: Tier,
    #[serde(flatten)]
    pub content: PayloadContent,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PayloadContent {
    /// One message, fields inlined at the top level.
    Single {
        #[serde(flatten)]
        message: CanonicalMessage,
        #[serde(flatten)]
        burst: Option<BurstLead>,
    },
    /// Coalesced follow-up batch.
    Batch {
        messages: Vec<CanonicalMessage>,
        message_count: usize,
        burst_mode: bool,
        is_follow_up: bool,
    },
}

/// Marks the immediate delivery that opens a burst.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BurstLead {
    pub is_first_in_burst: bool,
    pub message_count: usize,
}

impl WorkflowPayload {
    #[must_use]
    pub fn single(tier: Tier, message: CanonicalMessage) -> Self {
        Self::new(tier, PayloadContent::Single {
            message,
            burst: None,
        })
    }

    #[must_use]
    pub fn first_in_burst(tier: Tier, message: CanonicalMessage) -> Self {
        Self::new(tier, PayloadContent::Single {
            message,
            burst: Some(BurstLead {
                is_first_in_burst: true,
                message_count: 1,
            }),
        })
    }

    /// Follow-up batch. `messages` keeps arrival order.
    #[must_use]
    pub fn batch(tier: Tier, messages: Vec<CanonicalMessage>) -> Self {
        let message_count = messages.len();
        Self::new(tier, PayloadContent::Batch {
            messages,
            message_count,
            burst_mode: true,
            is_follow_up: true,
        })
    }

    fn new(workflow_type: Tier, content: PayloadContent) -> Self {
        Self {
            workflow_type,
            content,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[CanonicalMessage] {
        match &self.content {
            PayloadContent::Single { message, .. } => std::slice::from_ref(message),
            PayloadContent::Batch { messages, .. } => messages,
        }
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages().len()
    }

    #[must_use]
    pub fn is_follow_up(&self) -> bool {
        matches!(self.content, PayloadContent::Batch { .. })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_channels::{ChatKind, RawEvent},
        courier_routing::normalize,
    };

    fn message(text: &str) -> CanonicalMessage {
        normalize(&RawEvent::text(-100, 7, ChatKind::Group, text))
    }

    #[test]
    fn single_inlines_message_fields() {
        let json = serde_json::to_value(WorkflowPayload::single(Tier::Agent, message("hi"))).unwrap();
        assert_eq!(json["workflow_type"], "agent");
        assert_eq!(json["chat_id"], -100);
        assert_eq!(json["sender_id"], 7);
        assert_eq!(json["text"], "hi");
        assert!(json.get("timestamp").is_some());
        assert!(json.get("is_first_in_burst").is_none());
        assert!(json.get("messages").is_none());
    }

    #[test]
    fn burst_lead_is_tagged() {
        let json = serde_json::to_value(WorkflowPayload::first_in_burst(
            Tier::DirectMention,
            message("@satya"),
        ))
        .unwrap();
        assert_eq!(json["is_first_in_burst"], true);
        assert_eq!(json["message_count"], 1);
        assert_eq!(json["text"], "@satya");
    }

    #[test]
    fn batch_keeps_order_and_count() {
        let payload = WorkflowPayload::batch(Tier::DirectMention, vec![
            message("one"),
            message("two"),
            message("three"),
        ]);
        assert!(payload.is_follow_up());
        assert_eq!(payload.message_count(), 3);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["workflow_type"], "direct_mention");
        assert_eq!(json["burst_mode"], true);
        assert_eq!(json["is_follow_up"], true);
        assert_eq!(json["message_count"], 3);
        let texts: Vec<_> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }
}
