//! Per-bucket burst coalescing.
//!
//! Each `(tier, chat)` bucket is either idle or armed with exactly one delay
//! timer. The first message after a quiet window is handed back for
//! immediate dispatch and arms the timer; anything arriving while armed is
//! queued and flushed as one batch when the timer fires or on force-flush.

use std::{
    collections::{BTreeMap, HashMap},
    mem,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    courier_config::CoalescingConfig,
    courier_routing::{CanonicalMessage, Tier},
    serde::Serialize,
    tokio::time::Instant,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::debug,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BucketKey {
    pub tier: Tier,
    pub chat_id: i64,
}

/// Receives flushed batches.
#[async_trait]
pub trait BurstSink: Send + Sync {
    async fn flush(&self, key: BucketKey, messages: Vec<CanonicalMessage>);
}

/// What the caller should do with a submitted message.
#[derive(Debug)]
pub enum Submission {
    /// First in a burst: dispatch it now.
    DispatchNow(CanonicalMessage),
    /// Queued for the next batch flush.
    Buffered,
}

struct ArmedTimer {
    cancel: CancellationToken,
    generation: u64,
}

#[derive(Default)]
struct Bucket {
    queue: Vec<CanonicalMessage>,
    last_flush: Option<Instant>,
    timer: Option<ArmedTimer>,
}

struct Inner {
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
    windows: HashMap<Tier, Duration>,
    sink: Arc<dyn BurstSink>,
    generation: AtomicU64,
    timers: TaskTracker,
}

#[derive(Clone)]
pub struct CoalescingScheduler {
    inner: Arc<Inner>,
}

impl CoalescingScheduler {
    pub fn new(windows: HashMap<Tier, Duration>, sink: Arc<dyn BurstSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                buckets: Mutex::new(HashMap::new()),
                windows,
                sink,
                generation: AtomicU64::new(0),
                timers: TaskTracker::new(),
            }),
        }
    }

    /// Direct and general mentions get their own windows.
    pub fn from_config(config: &CoalescingConfig, sink: Arc<dyn BurstSink>) -> Self {
        Self::new(
            HashMap::from([
                (
                    Tier::DirectMention,
                    Duration::from_secs(config.direct_mention_window_secs),
                ),
                (
                    Tier::GeneralMention,
                    Duration::from_secs(config.general_mention_window_secs),
                ),
            ]),
            sink,
        )
    }

    #[must_use]
    pub fn applies_to(&self, tier: Tier) -> bool {
        self.inner.windows.contains_key(&tier)
    }

    #[must_use]
    pub fn window(&self, tier: Tier) -> Option<Duration> {
        self.inner.windows.get(&tier).copied()
    }

    /// Admit a message into its bucket. Tiers without a window are always
    /// dispatched immediately.
    pub fn submit(&self, key: BucketKey, message: CanonicalMessage) -> Submission {
        let Some(window) = self.window(key.tier) else {
            return Submission::DispatchNow(message);
        };
        let now = Instant::now();

        let mut buckets = self.inner.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if !buckets.contains_key(&key) {
            self.inner.prune(&mut buckets, now);
        }
        let bucket = buckets.entry(key).or_default();

        if bucket.timer.is_some() {
            bucket.queue.push(message);
            return Submission::Buffered;
        }

        match bucket.last_flush.map(|last| now.duration_since(last)) {
            Some(elapsed) if elapsed <= window => {
                // Idle, but still inside the window of the last flush: this
                // is a follow-up, so wait out the remainder.
                bucket.queue.push(message);
                self.inner.arm(bucket, key, window - elapsed);
                Submission::Buffered
            },
            _ => {
                bucket.last_flush = Some(now);
                self.inner.arm(bucket, key, window);
                Submission::DispatchNow(message)
            },
        }
    }

    /// Flush every non-empty bucket now and cancel all pending timers.
    /// Returns the number of batches flushed.
    pub async fn force_flush(&self) -> usize {
        let batches: Vec<(BucketKey, Vec<CanonicalMessage>)> = {
            let mut buckets = self.inner.buckets.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            buckets
                .iter_mut()
                .filter_map(|(key, bucket)| {
                    if let Some(timer) = bucket.timer.take() {
                        timer.cancel.cancel();
                    }
                    if bucket.queue.is_empty() {
                        return None;
                    }
                    bucket.last_flush = Some(now);
                    Some((*key, mem::take(&mut bucket.queue)))
                })
                .collect()
        };

        let flushed = batches.len();
        for (key, messages) in batches {
            self.inner.sink.flush(key, messages).await;
        }
        flushed
    }

    /// Sizes of all non-empty buffers.
    #[must_use]
    pub fn pending_sizes(&self) -> BTreeMap<BucketKey, usize> {
        let buckets = self.inner.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .iter()
            .filter(|(_, b)| !b.queue.is_empty())
            .map(|(k, b)| (*k, b.queue.len()))
            .collect()
    }

    #[must_use]
    pub fn armed_count(&self) -> usize {
        let buckets = self.inner.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.values().filter(|b| b.timer.is_some()).count()
    }

    /// Number of tracked buckets, idle ones included.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.inner
            .buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Force-flush, then wait for every timer task (including a flush that
    /// was already in progress) to finish. Used on shutdown.
    pub async fn drain(&self) -> usize {
        let flushed = self.force_flush().await;
        self.inner.timers.close();
        self.inner.timers.wait().await;
        flushed
    }
}

impl Inner {
    fn arm(self: &Arc<Self>, bucket: &mut Bucket, key: BucketKey, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        bucket.timer = Some(ArmedTimer {
            cancel: cancel.clone(),
            generation,
        });

        let inner = Arc::clone(self);
        self.timers.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {},
                () = tokio::time::sleep(delay) => inner.elapse(key, generation).await,
            }
        });
        debug!(tier = %key.tier, chat_id = key.chat_id, ?delay, "coalescing timer armed");
    }

    /// Drop idle buckets whose last flush is more than a window old.
    fn prune(&self, buckets: &mut HashMap<BucketKey, Bucket>, now: Instant) {
        buckets.retain(|key, bucket| {
            let window = self.windows.get(&key.tier).copied().unwrap_or_default();
            bucket.timer.is_some()
                || !bucket.queue.is_empty()
                || bucket
                    .last_flush
                    .is_some_and(|last| now.duration_since(last) <= window)
        });
    }

    async fn elapse(self: &Arc<Self>, key: BucketKey, generation: u64) {
        let batch = {
            let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
            let Some(bucket) = buckets.get_mut(&key) else {
                return;
            };
            // Lost the race against a force-flush or a newer timer.
            if bucket.timer.as_ref().map(|t| t.generation) != Some(generation) {
                return;
            }
            bucket.timer = None;
            if bucket.queue.is_empty() {
                // A full window without follow-ups: the burst is over.
                buckets.remove(&key);
                None
            } else {
                bucket.last_flush = Some(Instant::now());
                let batch = mem::take(&mut bucket.queue);
                // Follow-ups inside the window of this flush join the next batch.
                if let Some(window) = self.windows.get(&key.tier) {
                    self.arm(bucket, key, *window);
                }
                Some(batch)
            }
        };

        if let Some(messages) = batch {
            self.sink.flush(key, messages).await;
        }
    }
}
