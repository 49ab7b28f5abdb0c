use std::{panic::AssertUnwindSafe, sync::Arc};

use {
    async_trait::async_trait,
    courier_delivery::{
        DeliveryOutcome, Dispatch, Disposition, Error as DeliveryError, FallbackRecord,
        FallbackSink, WorkflowPayload,
    },
    courier_routing::{CanonicalMessage, Tier},
    futures::FutureExt,
    tracing::{error, info, warn},
};

use crate::{
    coalesce::{BucketKey, BurstSink},
    error::Result,
    router::panic_message,
    stats::{MessageOutcome, PipelineStats},
};

/// Dispatches payloads and records every result in the fallback store:
/// an audit copy on success, a fallback record per message otherwise.
pub struct Deliverer {
    dispatcher: Arc<dyn Dispatch>,
    fallback: FallbackSink,
    stats: Arc<PipelineStats>,
}

impl Deliverer {
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        fallback: FallbackSink,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            dispatcher,
            fallback,
            stats,
        }
    }

    #[must_use]
    pub fn fallback(&self) -> &FallbackSink {
        &self.fallback
    }

    /// Deliver one payload. A missing endpoint is routed to the fallback
    /// store; any other dispatcher error is returned to the caller.
    pub async fn deliver(&self, tier: Tier, payload: &WorkflowPayload) -> Result<MessageOutcome> {
        let outcome = match self.dispatcher.dispatch(tier, payload).await {
            Ok(outcome) => outcome,
            Err(e @ DeliveryError::MissingEndpoint(_)) => {
                warn!(%tier, error = %e, "no workflow endpoint, storing as fallback");
                self.store_all(payload.messages(), Disposition::Fallback, tier, Some(e.to_string()))
                    .await;
                return Ok(MessageOutcome::Fallback);
            },
            Err(e) => return Err(e.into()),
        };

        if outcome.is_delivered() {
            info!(%tier, messages = payload.message_count(), follow_up = payload.is_follow_up(), "delivered");
            self.store_all(payload.messages(), Disposition::Delivered, tier, None)
                .await;
            Ok(MessageOutcome::Delivered)
        } else {
            warn!(%tier, %outcome, messages = payload.message_count(), "delivery failed, storing as fallback");
            let reason = outcome.routing_error().map(str::to_string);
            self.store_all(payload.messages(), Disposition::Fallback, tier, reason)
                .await;
            Ok(MessageOutcome::Fallback)
        }
    }

    async fn store_all(
        &self,
        messages: &[CanonicalMessage],
        disposition: Disposition,
        tier: Tier,
        error: Option<String>,
    ) {
        for message in messages {
            let mut record = FallbackRecord::from_message(disposition, message).with_intended(tier);
            if let Some(error) = &error {
                record = record.with_error(error.clone());
            }
            self.fallback.record(record).await;
        }
    }
}

#[async_trait]
impl BurstSink for Deliverer {
    async fn flush(&self, key: BucketKey, messages: Vec<CanonicalMessage>) {
        let payload = WorkflowPayload::batch(key.tier, messages);
        let result = AssertUnwindSafe(self.deliver(key.tier, &payload))
            .catch_unwind()
            .await;
        let delivered = match result {
            Ok(Ok(outcome)) => outcome == MessageOutcome::Delivered,
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!(tier = %key.tier, chat_id = key.chat_id, error = %reason, "burst delivery panicked");
                for message in payload.messages() {
                    self.fallback
                        .record(FallbackRecord::critical(
                            message.chat_id,
                            message.sender_id,
                            reason.clone(),
                        ))
                        .await;
                }
                false
            },
            Ok(Err(e)) => {
                warn!(tier = %key.tier, chat_id = key.chat_id, error = %e, "burst dispatch failed");
                self.store_all(
                    payload.messages(),
                    Disposition::Fallback,
                    key.tier,
                    Some(e.to_string()),
                )
                .await;
                false
            },
        };
        self.stats.record_batch(delivered);
    }
}
