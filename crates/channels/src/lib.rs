//! Transport seam for courier.
//!
//! A chat transport (Telegram today) implements [`InboundEvent`] for the raw
//! events it receives and [`ChatOutbound`] for sending replies. Everything
//! downstream of the transport only sees these traits.

pub mod error;
pub mod event;
pub mod outbound;

pub use {
    error::{Error, Result},
    event::{ChatKind, InboundEvent, InboundReceiver, InboundSender, RawEvent, inbound_channel},
    outbound::{ChatOutbound, SentMessage},
};
