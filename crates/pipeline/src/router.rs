//! Per-message processing with exactly one terminal disposition.
//!
//! Admission (normalize, classify, coalescing submit) is synchronous and runs
//! in the inbound loop, so buckets see messages in arrival order. Completion
//! (dispatch and fallback writes) runs in its own task. Both halves are
//! guarded against panics; anything that escapes becomes a `critical_error`
//! record built from identity fields only.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use {
    courier_channels::{InboundEvent, InboundReceiver},
    courier_config::CoalescingConfig,
    courier_delivery::{Dispatch, Disposition, FallbackRecord, FallbackSink, WorkflowPayload},
    courier_routing::{Classifier, SharedRoutingState, Tier, normalize},
    futures::FutureExt,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, error, info, warn},
};

use crate::{
    admin::AdminService,
    coalesce::{BucketKey, BurstSink, CoalescingScheduler, Submission},
    deliver::Deliverer,
    error::{Error, Result},
    stats::{MessageOutcome, PipelineStats},
};

enum Step {
    Done(MessageOutcome),
    Store {
        record: FallbackRecord,
        outcome: MessageOutcome,
    },
    Deliver {
        tier: Tier,
        payload: WorkflowPayload,
    },
    Critical(String),
}

/// A message that has passed admission and awaits completion.
pub struct Admitted {
    chat_id: i64,
    sender_id: i64,
    step: Step,
}

pub struct Pipeline {
    classifier: Arc<Classifier>,
    state: SharedRoutingState,
    scheduler: CoalescingScheduler,
    deliverer: Arc<Deliverer>,
    stats: Arc<PipelineStats>,
    completions: TaskTracker,
}

impl Pipeline {
    pub fn new(
        classifier: Classifier,
        state: SharedRoutingState,
        dispatcher: Arc<dyn Dispatch>,
        fallback: FallbackSink,
        coalescing: &CoalescingConfig,
    ) -> Self {
        let stats = Arc::new(PipelineStats::default());
        let deliverer = Arc::new(Deliverer::new(dispatcher, fallback, Arc::clone(&stats)));
        let scheduler = CoalescingScheduler::from_config(
            coalescing,
            Arc::clone(&deliverer) as Arc<dyn BurstSink>,
        );
        Self {
            classifier: Arc::new(classifier),
            state,
            scheduler,
            deliverer,
            stats,
            completions: TaskTracker::new(),
        }
    }

    #[must_use]
    pub fn admin(&self) -> AdminService {
        AdminService::new(
            Arc::clone(&self.classifier),
            Arc::clone(&self.state),
            self.scheduler.clone(),
            Arc::clone(&self.stats),
            self.deliverer.fallback().clone(),
        )
    }

    #[must_use]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    #[must_use]
    pub fn scheduler(&self) -> &CoalescingScheduler {
        &self.scheduler
    }

    /// Consume the inbound stream until it closes or `cancel` fires.
    ///
    /// On cancel the stream is closed and every event already queued is
    /// still admitted. Completions keep running; await [`Pipeline::shutdown`]
    /// after this returns to wait for them.
    pub async fn run(self: Arc<Self>, mut inbound: InboundReceiver, cancel: CancellationToken) {
        info!("pipeline started");
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = inbound.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.spawn_completion(&*event);
        }

        inbound.close();
        let mut drained = 0usize;
        while let Ok(event) = inbound.try_recv() {
            self.spawn_completion(&*event);
            drained += 1;
        }
        info!(drained, "pipeline stopped");
    }

    fn spawn_completion(self: &Arc<Self>, event: &dyn InboundEvent) {
        let admitted = self.admit(event);
        let pipeline = Arc::clone(self);
        self.completions.spawn(async move {
            pipeline.complete(admitted).await;
        });
    }

    /// Flush pending bursts and wait for every in-flight completion and
    /// timer. Call once `run` has returned. Returns the batches flushed.
    pub async fn shutdown(&self) -> usize {
        let flushed = self.scheduler.drain().await;
        self.completions.close();
        self.completions.wait().await;
        info!(flushed, "pipeline drained");
        flushed
    }

    /// Process one event to completion.
    pub async fn process(&self, event: &dyn InboundEvent) -> MessageOutcome {
        let admitted = self.admit(event);
        self.complete(admitted).await
    }

    pub fn admit(&self, event: &dyn InboundEvent) -> Admitted {
        let chat_id = event.chat_id();
        let sender_id = event.sender_id().unwrap_or(chat_id);
        let step = catch_unwind(AssertUnwindSafe(|| self.route(event)))
            .unwrap_or_else(|panic| Step::Critical(panic_message(&*panic)));
        Admitted {
            chat_id,
            sender_id,
            step,
        }
    }

    pub async fn complete(&self, admitted: Admitted) -> MessageOutcome {
        let Admitted {
            chat_id,
            sender_id,
            step,
        } = admitted;

        let outcome = match AssertUnwindSafe(self.finish(step)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.critical(chat_id, sender_id, e.to_string()).await,
            Err(panic) => {
                self.critical(chat_id, sender_id, panic_message(&*panic))
                    .await
            },
        };
        self.stats.record(outcome);
        outcome
    }

    fn route(&self, event: &dyn InboundEvent) -> Step {
        let message = normalize(event);

        if let Some(problem) = &message.extraction_error {
            warn!(chat_id = message.chat_id, error = %problem, "degraded event, storing as fallback");
            let record = FallbackRecord::from_message(Disposition::Fallback, &message)
                .with_error(format!("extraction error: {problem}"));
            return Step::Store {
                record,
                outcome: MessageOutcome::Fallback,
            };
        }

        let tier = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            self.classifier.classify(&message, &state)
        };

        match tier {
            Tier::Junk => {
                debug!(chat_id = message.chat_id, sender_id = message.sender_id, "junk dropped");
                Step::Done(MessageOutcome::Junk)
            },
            Tier::Unclassified => {
                warn!(chat_id = message.chat_id, sender_id = message.sender_id, "unclassified");
                Step::Store {
                    record: FallbackRecord::from_message(Disposition::Unclassified, &message),
                    outcome: MessageOutcome::Unclassified,
                }
            },
            tier if self.scheduler.applies_to(tier) => {
                let key = BucketKey {
                    tier,
                    chat_id: message.chat_id,
                };
                match self.scheduler.submit(key, message) {
                    Submission::DispatchNow(message) => Step::Deliver {
                        tier,
                        payload: WorkflowPayload::first_in_burst(tier, message),
                    },
                    Submission::Buffered => {
                        debug!(%tier, chat_id = key.chat_id, "buffered");
                        Step::Done(MessageOutcome::Buffered)
                    },
                }
            },
            tier => Step::Deliver {
                tier,
                payload: WorkflowPayload::single(tier, message),
            },
        }
    }

    async fn finish(&self, step: Step) -> Result<MessageOutcome> {
        match step {
            Step::Done(outcome) => Ok(outcome),
            Step::Store { record, outcome } => {
                self.deliverer.fallback().record(record).await;
                Ok(outcome)
            },
            Step::Deliver { tier, payload } => self.deliverer.deliver(tier, &payload).await,
            Step::Critical(message) => Err(Error::message(message)),
        }
    }

    async fn critical(&self, chat_id: i64, sender_id: i64, error: String) -> MessageOutcome {
        error!(chat_id, sender_id, %error, "message processing failed");
        self.deliverer
            .fallback()
            .record(FallbackRecord::critical(chat_id, sender_id, error))
            .await;
        MessageOutcome::CriticalError
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        chrono::{DateTime, Utc},
        courier_channels::{ChatKind, RawEvent, inbound_channel},
        courier_config::{RoutingConfig, ToggleDefaults},
        courier_delivery::{
            DeliveryOutcome, FallbackStore, LastResortLog, MemoryFallbackStore,
            Result as DeliveryResult, WebhookDispatcher,
        },
        courier_routing::RoutingState,
        std::{collections::HashMap, sync::Mutex, time::Duration},
    };

    const BOSS: i64 = 1;
    const USER: i64 = 2;
    const AGENT_CHAT: i64 = -10;

    #[derive(Default)]
    struct RecordingDispatch {
        calls: Mutex<Vec<(Tier, serde_json::Value)>>,
    }

    impl RecordingDispatch {
        fn calls(&self) -> Vec<(Tier, serde_json::Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dispatch for RecordingDispatch {
        async fn dispatch(
            &self,
            tier: Tier,
            payload: &WorkflowPayload,
        ) -> DeliveryResult<DeliveryOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((tier, serde_json::to_value(payload).unwrap()));
            Ok(DeliveryOutcome::Delivered)
        }
    }

    /// Event whose text read panics.
    struct PoisonedEvent;

    impl InboundEvent for PoisonedEvent {
        fn chat_id(&self) -> i64 {
            -77
        }

        fn sender_id(&self) -> courier_channels::Result<i64> {
            Ok(USER)
        }

        fn message_id(&self) -> courier_channels::Result<i64> {
            Ok(1)
        }

        fn text(&self) -> Option<String> {
            panic!("transport exploded")
        }

        fn timestamp(&self) -> courier_channels::Result<DateTime<Utc>> {
            Ok(Utc::now())
        }

        fn chat_kind(&self) -> courier_channels::Result<ChatKind> {
            Ok(ChatKind::Group)
        }

        fn sender_display_name(&self) -> courier_channels::Result<Option<String>> {
            Ok(None)
        }

        fn chat_title(&self) -> courier_channels::Result<Option<String>> {
            Ok(None)
        }

        fn has_media(&self) -> bool {
            false
        }
    }

    fn routing() -> RoutingConfig {
        RoutingConfig {
            privileged_sender_id: Some(BOSS),
            agent_chats: vec![AGENT_CHAT],
            toggles: ToggleDefaults {
                agent: true,
                mention: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pipeline_with(
        dispatcher: Arc<dyn Dispatch>,
        routing: RoutingConfig,
    ) -> (Pipeline, Arc<MemoryFallbackStore>) {
        let store = Arc::new(MemoryFallbackStore::new());
        let sink = FallbackSink::new(
            Arc::clone(&store) as Arc<dyn FallbackStore>,
            LastResortLog::new(std::env::temp_dir().join("courier-router-test.jsonl")),
        );
        let pipeline = Pipeline::new(
            Classifier::from_config(&routing),
            RoutingState::from_config(&routing).into_shared(),
            dispatcher,
            sink,
            &CoalescingConfig::default(),
        );
        (pipeline, store)
    }

    async fn webhook_pipeline(
        server: &mockito::Server,
    ) -> (Pipeline, Arc<MemoryFallbackStore>) {
        let endpoints = HashMap::from([
            (Tier::Agent, format!("{}/agent", server.url())),
            (Tier::Priority, format!("{}/priority", server.url())),
            (Tier::BackgroundLog, format!("{}/log", server.url())),
        ]);
        let dispatcher = WebhookDispatcher::new(endpoints, Duration::from_secs(10)).unwrap();
        pipeline_with(Arc::new(dispatcher), routing())
    }

    #[tokio::test]
    async fn agent_request_is_delivered_and_audited() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/agent")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let (pipeline, store) = webhook_pipeline(&server).await;

        let event = RawEvent::text(
            AGENT_CHAT,
            USER,
            ChatKind::Group,
            "hey satya can you help me build a report",
        );
        assert_eq!(pipeline.process(&event).await, MessageOutcome::Delivered);
        mock.assert_async().await;

        let records = store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].disposition, Disposition::Delivered);
        assert_eq!(pipeline.stats().snapshot().delivered, 1);
    }

    #[tokio::test]
    async fn junk_is_silently_dropped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let (pipeline, store) = webhook_pipeline(&server).await;

        let event = RawEvent::text(AGENT_CHAT, USER, ChatKind::Group, "bc");
        assert_eq!(pipeline.process(&event).await, MessageOutcome::Junk);
        mock.assert_async().await;
        assert!(store.all().await.is_empty());
        assert_eq!(pipeline.stats().snapshot().junk, 1);
    }

    #[tokio::test]
    async fn endpoint_failure_goes_to_fallback() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/agent")
            .with_status(500)
            .create_async()
            .await;
        let (pipeline, store) = webhook_pipeline(&server).await;

        let event = RawEvent::text(AGENT_CHAT, USER, ChatKind::Group, "can you build it");
        assert_eq!(pipeline.process(&event).await, MessageOutcome::Fallback);

        let records = store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].disposition, Disposition::Fallback);
        assert_eq!(records[0].intended_workflow, Some(Tier::Agent));
        assert_eq!(records[0].routing_error.as_deref(), Some("n8n webhook failed"));
    }

    #[tokio::test]
    async fn missing_endpoint_goes_to_fallback() {
        let server = mockito::Server::new_async().await;
        let (pipeline, store) = webhook_pipeline(&server).await;

        // Direct mentions have no endpoint configured above.
        let event = RawEvent::text(-30, USER, ChatKind::Group, "@satya ping");
        assert_eq!(pipeline.process(&event).await, MessageOutcome::Fallback);
        let records = store.all().await;
        assert_eq!(records[0].intended_workflow, Some(Tier::DirectMention));
        assert!(records[0]
            .routing_error
            .as_deref()
            .unwrap()
            .contains("no endpoint"));
    }

    #[tokio::test]
    async fn unclassified_is_stored() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let mut config = routing();
        config.toggles.logging = false;
        let (pipeline, store) = pipeline_with(dispatcher.clone(), config);

        let event = RawEvent::text(USER, USER, ChatKind::Private, "just chatting");
        assert_eq!(pipeline.process(&event).await, MessageOutcome::Unclassified);
        assert!(dispatcher.calls().is_empty());
        let records = store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].disposition, Disposition::Unclassified);
    }

    #[tokio::test]
    async fn degraded_event_skips_classification() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let (pipeline, store) = pipeline_with(dispatcher.clone(), routing());

        let mut event = RawEvent::text(AGENT_CHAT, USER, ChatKind::Group, "can you build it");
        event.sender_id = None;
        assert_eq!(pipeline.process(&event).await, MessageOutcome::Fallback);
        assert!(dispatcher.calls().is_empty());
        let records = store.all().await;
        assert_eq!(records.len(), 1);
        assert!(records[0]
            .routing_error
            .as_deref()
            .unwrap()
            .starts_with("extraction error"));
    }

    #[tokio::test]
    async fn panic_becomes_critical_record() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let (pipeline, store) = pipeline_with(dispatcher, routing());

        assert_eq!(
            pipeline.process(&PoisonedEvent).await,
            MessageOutcome::CriticalError
        );
        let records = store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].disposition, Disposition::CriticalError);
        assert_eq!(records[0].chat_id, -77);
        assert_eq!(records[0].sender_id, USER);
        assert!(records[0].routing_error.as_deref().unwrap().contains("transport exploded"));
        assert_eq!(pipeline.stats().snapshot().critical, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mention_burst_produces_two_deliveries() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let (pipeline, _store) = pipeline_with(dispatcher.clone(), routing());

        for text in ["@satya one", "@satya two", "@satya three", "@satya four"] {
            let event = RawEvent::text(-30, USER, ChatKind::Group, text);
            pipeline.process(&event).await;
        }
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["is_first_in_burst"], true);
        assert_eq!(calls[0].1["message_count"], 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, Tier::DirectMention);
        assert_eq!(calls[1].1["is_follow_up"], true);
        assert_eq!(calls[1].1["message_count"], 3);
        assert_eq!(calls[1].1["messages"][0]["text"], "@satya two");

        let snap = pipeline.stats().snapshot();
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.buffered, 3);
        assert_eq!(snap.batches_delivered, 1);
    }

    #[tokio::test]
    async fn privileged_sender_reaches_priority() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let (pipeline, _store) = pipeline_with(dispatcher.clone(), routing());

        let event = RawEvent::text(-999, BOSS, ChatKind::Group, "ok");
        assert_eq!(pipeline.process(&event).await, MessageOutcome::Delivered);
        assert_eq!(dispatcher.calls()[0].0, Tier::Priority);
    }

    #[tokio::test]
    async fn run_loop_drains_until_closed() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let (pipeline, _store) = pipeline_with(dispatcher.clone(), routing());
        let pipeline = Arc::new(pipeline);
        let (tx, rx) = inbound_channel(8);

        let handle = tokio::spawn(Arc::clone(&pipeline).run(rx, CancellationToken::new()));
        tx.send(Box::new(RawEvent::text(AGENT_CHAT, USER, ChatKind::Group, "can you build it")))
            .await
            .unwrap();
        tx.send(Box::new(PoisonedEvent)).await.unwrap();
        tx.send(Box::new(RawEvent::text(AGENT_CHAT, USER, ChatKind::Group, "no")))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();
        pipeline.shutdown().await;

        let snap = pipeline.stats().snapshot();
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.critical, 1);
        assert_eq!(snap.junk, 1);
    }

    #[tokio::test]
    async fn queued_events_are_processed_after_cancel() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let (pipeline, store) = pipeline_with(dispatcher.clone(), routing());
        let pipeline = Arc::new(pipeline);
        let (tx, rx) = inbound_channel(8);
        for i in 0..5 {
            let text = format!("can you build report {i}");
            tx.send(Box::new(RawEvent::text(AGENT_CHAT, USER, ChatKind::Group, text)))
                .await
                .unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        Arc::clone(&pipeline).run(rx, cancel).await;
        pipeline.shutdown().await;

        assert_eq!(pipeline.stats().snapshot().delivered, 5);
        assert_eq!(store.all().await.len(), 5);
        assert_eq!(dispatcher.calls().len(), 5);
        // The stream is closed to the transport once the loop stops.
        assert!(tx.send(Box::new(RawEvent::default())).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_bursts() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let (pipeline, _store) = pipeline_with(dispatcher.clone(), routing());
        for text in ["@satya one", "@satya two"] {
            pipeline
                .process(&RawEvent::text(-30, USER, ChatKind::Group, text))
                .await;
        }
        assert_eq!(pipeline.shutdown().await, 1);
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1["messages"][0]["text"], "@satya two");
        assert_eq!(pipeline.scheduler().armed_count(), 0);
    }

    /// Delivers first-in-burst messages, panics on follow-up batches.
    struct PanicOnFollowUp;

    #[async_trait]
    impl Dispatch for PanicOnFollowUp {
        async fn dispatch(
            &self,
            _tier: Tier,
            payload: &WorkflowPayload,
        ) -> DeliveryResult<DeliveryOutcome> {
            if payload.is_follow_up() {
                panic!("batch dispatch exploded");
            }
            Ok(DeliveryOutcome::Delivered)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_burst_flush_is_recorded() {
        let (pipeline, store) = pipeline_with(Arc::new(PanicOnFollowUp), routing());
        for text in ["@satya a", "@satya b", "@satya c"] {
            pipeline
                .process(&RawEvent::text(-30, USER, ChatKind::Group, text))
                .await;
        }
        tokio::time::sleep(Duration::from_secs(11)).await;
        pipeline.shutdown().await;

        let records = store.all().await;
        assert_eq!(records.len(), 3);
        let critical = records
            .iter()
            .filter(|r| r.disposition == Disposition::CriticalError)
            .count();
        assert_eq!(critical, 2);
        assert_eq!(pipeline.stats().snapshot().batches_failed, 1);
    }

    #[tokio::test]
    async fn run_loop_stops_on_cancel() {
        let dispatcher = Arc::new(RecordingDispatch::default());
        let (pipeline, _store) = pipeline_with(dispatcher, routing());
        let (_tx, rx) = inbound_channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(pipeline).run(rx, cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }
}
