use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Terminal disposition of one inbound message as seen by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOutcome {
    Delivered,
    /// Stored in the fallback store after a failed or impossible delivery.
    Fallback,
    Unclassified,
    /// Silently dropped.
    Junk,
    /// Handed to the coalescing scheduler; delivered later in a batch.
    Buffered,
    CriticalError,
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    delivered: AtomicU64,
    fallback: AtomicU64,
    unclassified: AtomicU64,
    junk: AtomicU64,
    buffered: AtomicU64,
    critical: AtomicU64,
    batches_delivered: AtomicU64,
    batches_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub fallback: u64,
    pub unclassified: u64,
    pub junk: u64,
    pub buffered: u64,
    pub critical: u64,
    pub batches_delivered: u64,
    pub batches_failed: u64,
}

impl PipelineStats {
    pub fn record(&self, outcome: MessageOutcome) {
        let counter = match outcome {
            MessageOutcome::Delivered => &self.delivered,
            MessageOutcome::Fallback => &self.fallback,
            MessageOutcome::Unclassified => &self.unclassified,
            MessageOutcome::Junk => &self.junk,
            MessageOutcome::Buffered => &self.buffered,
            MessageOutcome::CriticalError => &self.critical,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, delivered: bool) {
        let counter = if delivered {
            &self.batches_delivered
        } else {
            &self.batches_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            junk: self.junk.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            critical: self.critical.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
        }
    }
}
