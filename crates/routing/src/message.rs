use {
    chrono::{DateTime, Utc},
    courier_channels::{ChatKind, InboundEvent},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

/// Immutable snapshot of one inbound event.
///
/// `sender_id` and `chat_id` are always present. Optional metadata degrades
/// to `None` when the transport cannot provide it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub sender_id: i64,
    pub chat_id: i64,
    pub text: String,
    pub message_id: Option<i64>,
    pub captured_at: DateTime<Utc>,
    pub is_private: bool,
    pub is_group: bool,
    pub is_channel: bool,
    pub sender_display_name: Option<String>,
    pub chat_title: Option<String>,
    pub has_media: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    /// Set when a required field could not be read; such records skip
    /// classification and go straight to the fallback store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
}

impl CanonicalMessage {
    #[must_use]
    pub fn chat_kind(&self) -> ChatKind {
        if self.is_channel {
            ChatKind::Channel
        } else if self.is_group {
            ChatKind::Group
        } else {
            ChatKind::Private
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.extraction_error.is_some()
    }

    /// Minimal record carrying only the identity fields. Used by the
    /// critical-error path, which must not depend on anything else.
    #[must_use]
    pub fn minimal(chat_id: i64, sender_id: Option<i64>, error: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.unwrap_or(chat_id),
            chat_id,
            text: String::new(),
            message_id: None,
            captured_at: Utc::now(),
            is_private: false,
            is_group: false,
            is_channel: false,
            sender_display_name: None,
            chat_title: None,
            has_media: false,
            reply_to_message_id: None,
            extraction_error: Some(error.into()),
        }
    }
}

/// Telegram convention: user IDs are positive, group and channel IDs negative.
fn infer_chat_kind(chat_id: i64) -> ChatKind {
    if chat_id > 0 {
        ChatKind::Private
    } else {
        ChatKind::Group
    }
}

/// Convert a raw transport event into a [`CanonicalMessage`].
///
/// Never fails. Missing required fields (sender, conversation kind) are
/// substituted and recorded in `extraction_error`; missing optional
/// metadata is dropped to `None`.
pub fn normalize(event: &dyn InboundEvent) -> CanonicalMessage {
    let chat_id = event.chat_id();
    let mut problems: Vec<String> = Vec::new();

    let sender_id = event.sender_id().unwrap_or_else(|e| {
        problems.push(e.to_string());
        chat_id
    });

    let kind = event.chat_kind().unwrap_or_else(|e| {
        problems.push(e.to_string());
        infer_chat_kind(chat_id)
    });

    let message_id = event
        .message_id()
        .inspect_err(|e| debug!(chat_id, error = %e, "message id unavailable"))
        .ok();

    let captured_at = event.timestamp().unwrap_or_else(|e| {
        debug!(chat_id, error = %e, "event timestamp unavailable, using receive time");
        Utc::now()
    });

    let sender_display_name = event.sender_display_name().unwrap_or_else(|e| {
        debug!(chat_id, sender_id, error = %e, "sender lookup failed");
        None
    });

    let chat_title = event.chat_title().unwrap_or_else(|e| {
        debug!(chat_id, error = %e, "chat lookup failed");
        None
    });

    let extraction_error = if problems.is_empty() {
        None
    } else {
        let joined = problems.join("; ");
        warn!(chat_id, error = %joined, "degraded inbound event");
        Some(joined)
    };

    CanonicalMessage {
        sender_id,
        chat_id,
        text: event.text().unwrap_or_default(),
        message_id,
        captured_at,
        is_private: kind == ChatKind::Private,
        is_group: kind == ChatKind::Group,
        is_channel: kind == ChatKind::Channel,
        sender_display_name,
        chat_title,
        has_media: event.has_media(),
        reply_to_message_id: event.reply_to_message_id(),
        extraction_error,
    }
}
