//! Telegram transport for courier.
//!
//! Long-polls the Bot API, wraps each message as an
//! [`InboundEvent`](courier_channels::InboundEvent) on the inbound stream,
//! and sends plain-text replies with chunking and rate-limit retry.

pub mod bot;
pub mod error;
pub mod event;
pub mod outbound;

pub use {
    bot::TelegramClient,
    error::{Error, Result},
    event::TelegramEvent,
    outbound::{TELEGRAM_MAX_MESSAGE_LEN, TelegramOutbound, chunk_message},
};
