use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    courier_channels::{ChatOutbound, Error as ChannelError, Result as ChannelResult, SentMessage},
    teloxide::{
        RequestError,
        prelude::*,
        types::{ChatId, MessageId},
    },
    tracing::{debug, warn},
};

/// Telegram's hard limit on message text length.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Plain-text sender for Telegram chats.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send_chunk(&self, chat_id: ChatId, chunk: &str) -> Result<MessageId, RequestError> {
        let message = run_with_retry(chat_id, "send message", || {
            let req = self.bot.send_message(chat_id, chunk);
            async move { req.await }
        })
        .await?;
        Ok(message.id)
    }
}

#[async_trait]
impl ChatOutbound for TelegramOutbound {
    async fn send_text(&self, chat_id: i64, text: &str) -> ChannelResult<SentMessage> {
        if text.trim().is_empty() {
            return Err(ChannelError::invalid_input("message text is empty"));
        }

        let chunks = chunk_message(text, TELEGRAM_MAX_MESSAGE_LEN);
        let mut message_ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let id = self
                .send_chunk(ChatId(chat_id), chunk)
                .await
                .map_err(|e| ChannelError::external("telegram send message", e))?;
            message_ids.push(i64::from(id.0));
        }
        debug!(chat_id, chunks = chunks.len(), "telegram message sent");

        Ok(SentMessage {
            chat_id,
            message_ids,
        })
    }
}

async fn run_with_retry<T, F, Fut>(
    chat_id: ChatId,
    operation: &'static str,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    operation,
                    retries,
                    max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

/// Split `text` into chunks of at most `max_len` bytes, preferring newline
/// then space boundaries and never splitting a UTF-8 character.
#[must_use]
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        return Vec::new();
    }
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut window = remaining.floor_char_boundary(max_len);
        if window == 0 {
            window = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }

        let slice = &remaining[..window];
        let split_at = match slice.rfind('\n').or_else(|| slice.rfind(' ')) {
            Some(0) | None => window,
            Some(idx) => idx,
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches(['\n', ' ']);
    }

    chunks
}
