use {async_trait::async_trait, serde::Serialize};

use crate::Result;

/// Result of a successful outbound send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub chat_id: i64,
    /// IDs of the messages created, one per chunk.
    pub message_ids: Vec<i64>,
}

/// Send messages to a chat through the transport.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<SentMessage>;
}
