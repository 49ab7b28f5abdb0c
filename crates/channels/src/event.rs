use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
};

use crate::{Error, Result};

/// Conversation kind of the chat an event was received in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

/// A raw inbound event as yielded by a chat transport.
///
/// Only `chat_id` is infallible. Every other read is best-effort: transports
/// return an error when the underlying update lacks the field or a metadata
/// lookup fails, and the normalizer degrades accordingly.
pub trait InboundEvent: Send + Sync {
    fn chat_id(&self) -> i64;

    fn sender_id(&self) -> Result<i64>;

    fn message_id(&self) -> Result<i64>;

    /// Text body or media caption. `None` when the event carries neither.
    fn text(&self) -> Option<String>;

    fn timestamp(&self) -> Result<DateTime<Utc>>;

    fn chat_kind(&self) -> Result<ChatKind>;

    fn sender_display_name(&self) -> Result<Option<String>>;

    fn chat_title(&self) -> Result<Option<String>>;

    fn has_media(&self) -> bool;

    /// Message ID this event replies to, if any.
    fn reply_to_message_id(&self) -> Option<i64> {
        None
    }
}

/// Sender half of the inbound event stream (transport side).
pub type InboundSender = mpsc::Sender<Box<dyn InboundEvent>>;

/// Receiver half of the inbound event stream (pipeline side).
pub type InboundReceiver = mpsc::Receiver<Box<dyn InboundEvent>>;

/// Create the bounded inbound stream connecting a transport to the pipeline.
pub fn inbound_channel(capacity: usize) -> (InboundSender, InboundReceiver) {
    mpsc::channel(capacity)
}

/// Owned, transport-independent event.
///
/// Used by the offline `classify` command and by tests. Missing optional
/// identity fields surface as [`Error::MissingField`] just like a real
/// transport would report them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub message_id: Option<i64>,
    pub text: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub chat_kind: Option<ChatKind>,
    pub sender_display_name: Option<String>,
    pub chat_title: Option<String>,
    pub has_media: bool,
    pub reply_to_message_id: Option<i64>,
}

impl RawEvent {
    /// A text event from `sender_id` in `chat_id`.
    pub fn text(chat_id: i64, sender_id: i64, kind: ChatKind, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender_id: Some(sender_id),
            message_id: Some(1),
            text: Some(text.into()),
            timestamp: Some(Utc::now()),
            chat_kind: Some(kind),
            ..Default::default()
        }
    }
}

impl InboundEvent for RawEvent {
    fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn sender_id(&self) -> Result<i64> {
        self.sender_id.ok_or_else(|| Error::missing("sender_id"))
    }

    fn message_id(&self) -> Result<i64> {
        self.message_id.ok_or_else(|| Error::missing("message_id"))
    }

    fn text(&self) -> Option<String> {
        self.text.clone()
    }

    fn timestamp(&self) -> Result<DateTime<Utc>> {
        self.timestamp.ok_or_else(|| Error::missing("timestamp"))
    }

    fn chat_kind(&self) -> Result<ChatKind> {
        self.chat_kind.ok_or_else(|| Error::missing("chat_kind"))
    }

    fn sender_display_name(&self) -> Result<Option<String>> {
        Ok(self.sender_display_name.clone())
    }

    fn chat_title(&self) -> Result<Option<String>> {
        Ok(self.chat_title.clone())
    }

    fn has_media(&self) -> bool {
        self.has_media
    }

    fn reply_to_message_id(&self) -> Option<i64> {
        self.reply_to_message_id
    }
}
