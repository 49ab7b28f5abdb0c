//! Message pipeline: normalize, classify, coalesce, deliver, and always
//! end in exactly one terminal disposition.

pub mod admin;
pub mod coalesce;
pub mod deliver;
pub mod error;
pub mod router;
pub mod stats;

pub use {
    admin::{AdminService, PendingBuffer, StatusReport},
    coalesce::{BucketKey, BurstSink, CoalescingScheduler, Submission},
    deliver::Deliverer,
    error::{Error, Result},
    router::Pipeline,
    stats::{MessageOutcome, PipelineStats, StatsSnapshot},
};
