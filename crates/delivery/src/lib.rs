//! Outbound side of the pipeline: webhook delivery and the fallback store
//! that catches everything delivery cannot.

pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod last_resort;
pub mod payload;
pub mod sqlite_store;

pub use {
    dispatcher::{DEFAULT_TIMEOUT, DeliveryOutcome, Dispatch, WebhookDispatcher},
    error::{Error, Result},
    fallback::{Disposition, FallbackRecord, FallbackSink, FallbackStore, MemoryFallbackStore},
    last_resort::LastResortLog,
    payload::{PayloadContent, WorkflowPayload},
    sqlite_store::SqliteFallbackStore,
};
