//! Fallback store: the durable sink every non-junk message ends up in.

use std::{fmt, str::FromStr, sync::Arc};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    courier_routing::{CanonicalMessage, Tier},
    serde::{Deserialize, Serialize},
    tokio::sync::Mutex,
    tracing::{error, warn},
};

use crate::{
    error::{Error, Result},
    last_resort::LastResortLog,
};

/// Why a record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Audit copy of a successfully delivered message.
    Delivered,
    /// No rule matched.
    Unclassified,
    /// Delivery failed or the message could not be routed.
    Fallback,
    /// Processing panicked or failed unexpectedly.
    CriticalError,
}

impl Disposition {
    pub const ALL: [Disposition; 4] = [
        Self::Delivered,
        Self::Unclassified,
        Self::Fallback,
        Self::CriticalError,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Unclassified => "unclassified",
            Self::Fallback => "fallback",
            Self::CriticalError => "critical_error",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::Corrupt(format!("unknown disposition {s:?}")))
    }
}

/// One row of the fallback store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub disposition: Disposition,
    pub intended_workflow: Option<Tier>,
    pub routing_error: Option<String>,
    pub chat_id: i64,
    pub sender_id: i64,
    pub message_id: Option<i64>,
    pub text: String,
    /// Full canonical message, or `null` for minimal critical records.
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl FallbackRecord {
    #[must_use]
    pub fn from_message(disposition: Disposition, message: &CanonicalMessage) -> Self {
        Self {
            disposition,
            intended_workflow: None,
            routing_error: None,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            message_id: message.message_id,
            text: message.text.clone(),
            payload: serde_json::to_value(message).unwrap_or(serde_json::Value::Null),
            recorded_at: Utc::now(),
        }
    }

    /// Identity fields and the error only. Building it cannot fail.
    #[must_use]
    pub fn critical(chat_id: i64, sender_id: i64, error: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::CriticalError,
            intended_workflow: None,
            routing_error: Some(error.into()),
            chat_id,
            sender_id,
            message_id: None,
            text: String::new(),
            payload: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_intended(mut self, tier: Tier) -> Self {
        self.intended_workflow = Some(tier);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.routing_error = Some(error.into());
        self
    }
}

#[async_trait]
pub trait FallbackStore: Send + Sync {
    async fn store(&self, record: &FallbackRecord) -> Result<()>;

    /// Most recent records first, optionally filtered by disposition.
    async fn recent(
        &self,
        disposition: Option<Disposition>,
        limit: u32,
    ) -> Result<Vec<FallbackRecord>>;
}

/// Non-durable store. Useful when no database is wanted and in tests.
#[derive(Default)]
pub struct MemoryFallbackStore {
    records: Mutex<Vec<FallbackRecord>>,
}

impl MemoryFallbackStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<FallbackRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl FallbackStore for MemoryFallbackStore {
    async fn store(&self, record: &FallbackRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn recent(
        &self,
        disposition: Option<Disposition>,
        limit: u32,
    ) -> Result<Vec<FallbackRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| disposition.is_none_or(|d| r.disposition == d))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Store wrapper that never fails from the caller's side.
///
/// A store failure falls through to a synchronous JSONL append; if that
/// fails too, the record is logged at `error` level.
#[derive(Clone)]
pub struct FallbackSink {
    store: Arc<dyn FallbackStore>,
    last_resort: Arc<LastResortLog>,
}

impl FallbackSink {
    pub fn new(store: Arc<dyn FallbackStore>, last_resort: LastResortLog) -> Self {
        Self {
            store,
            last_resort: Arc::new(last_resort),
        }
    }

    pub async fn record(&self, record: FallbackRecord) {
        let Err(e) = self.store.store(&record).await else {
            return;
        };
        warn!(error = %e, disposition = %record.disposition, "fallback store failed, using last-resort log");

        if let Err(e) = self.last_resort.append(&record) {
            let serialized = serde_json::to_string(&record)
                .unwrap_or_else(|_| format!("{record:?}"));
            error!(error = %e, record = %serialized, "last-resort log failed");
        }
    }

    pub async fn recent(
        &self,
        disposition: Option<Disposition>,
        limit: u32,
    ) -> Result<Vec<FallbackRecord>> {
        self.store.recent(disposition, limit).await
    }
}
