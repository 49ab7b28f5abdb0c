//! Operator operations over the live routing state and scheduler.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use {
    courier_config::ClassifierMode,
    courier_delivery::{Disposition, FallbackRecord, FallbackSink},
    courier_routing::{
        Classifier, RoutingState, RulesExport, SharedRoutingState, Tier, Toggle, ToggleState,
    },
    serde::Serialize,
    tracing::{info, warn},
};

use crate::{
    coalesce::CoalescingScheduler,
    error::Result,
    stats::{PipelineStats, StatsSnapshot},
};

#[derive(Debug, Clone, Serialize)]
pub struct PendingBuffer {
    pub tier: Tier,
    pub chat_id: i64,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub mode: ClassifierMode,
    pub privileged_sender_id: Option<i64>,
    pub toggles: BTreeMap<Toggle, ToggleState>,
    pub counts: StatsSnapshot,
    pub pending_buffers: Vec<PendingBuffer>,
    pub armed_timers: usize,
    pub uptime_secs: u64,
}

#[derive(Clone)]
pub struct AdminService {
    classifier: Arc<Classifier>,
    state: SharedRoutingState,
    scheduler: CoalescingScheduler,
    stats: Arc<PipelineStats>,
    fallback: FallbackSink,
    started_at: Instant,
}

impl AdminService {
    pub fn new(
        classifier: Arc<Classifier>,
        state: SharedRoutingState,
        scheduler: CoalescingScheduler,
        stats: Arc<PipelineStats>,
        fallback: FallbackSink,
    ) -> Self {
        Self {
            classifier,
            state,
            scheduler,
            stats,
            fallback,
            started_at: Instant::now(),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut RoutingState) -> T) -> T {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn read<T>(&self, f: impl FnOnce(&RoutingState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Enable or disable an ordinary toggle, globally or for one chat.
    /// The protected `priority` toggle is rejected here.
    pub fn set_toggle(&self, toggle: Toggle, enabled: bool, chat_id: Option<i64>) -> Result<bool> {
        let changed = self.write(|state| match (chat_id, enabled) {
            (None, enabled) => state.toggles.set_enabled(toggle, enabled),
            (Some(chat), true) => state.toggles.enable_for_chat(toggle, chat),
            (Some(chat), false) => state.toggles.disable_for_chat(toggle, chat),
        })?;
        info!(%toggle, enabled, ?chat_id, changed, "toggle updated");
        Ok(changed)
    }

    pub fn set_priority_enabled(&self, enabled: bool) -> bool {
        let changed = self.write(|state| state.toggles.set_priority_enabled(enabled));
        if enabled {
            info!(changed, "priority routing enabled");
        } else {
            warn!(changed, "priority routing disabled");
        }
        changed
    }

    pub fn set_sender_blocked(&self, sender_id: i64, blocked: bool) -> bool {
        let changed = self.write(|state| state.set_sender_blocked(sender_id, blocked));
        info!(sender_id, blocked, changed, "sender blocklist updated");
        changed
    }

    pub fn set_chat_blocked(&self, chat_id: i64, blocked: bool) -> bool {
        let changed = self.write(|state| state.set_chat_blocked(chat_id, blocked));
        info!(chat_id, blocked, changed, "chat blocklist updated");
        changed
    }

    pub fn set_group_allowed(&self, chat_id: i64, allowed: bool) -> bool {
        let changed = self.write(|state| state.set_group_allowed(chat_id, allowed));
        info!(chat_id, allowed, changed, "allowed groups updated");
        changed
    }

    /// Replace the privileged identity. Returns the previous one.
    pub fn rotate_privileged(&self, sender_id: Option<i64>) -> Option<i64> {
        let previous = self.write(|state| state.rotate_privileged(sender_id));
        warn!(?previous, current = ?sender_id, "privileged identity rotated");
        previous
    }

    #[must_use]
    pub fn export_rules(&self) -> RulesExport {
        self.read(|state| self.classifier.export(state))
    }

    /// Only `priority` and `logging` left on, every scope cleared.
    pub fn emergency_reset(&self) {
        self.write(RoutingState::reset_toggles);
        warn!("emergency reset: toggles restored to safe defaults");
    }

    pub async fn force_flush(&self) -> usize {
        let flushed = self.scheduler.force_flush().await;
        info!(flushed, "force flush");
        flushed
    }

    #[must_use]
    pub fn status(&self) -> StatusReport {
        let (privileged_sender_id, toggles) =
            self.read(|state| (state.privileged_sender(), state.toggles.snapshot()));
        let pending_buffers = self
            .scheduler
            .pending_sizes()
            .into_iter()
            .map(|(key, size)| PendingBuffer {
                tier: key.tier,
                chat_id: key.chat_id,
                size,
            })
            .collect();
        StatusReport {
            mode: self.classifier.mode(),
            privileged_sender_id,
            toggles,
            counts: self.stats.snapshot(),
            pending_buffers,
            armed_timers: self.scheduler.armed_count(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    pub async fn recent_fallback(
        &self,
        disposition: Option<Disposition>,
        limit: u32,
    ) -> Result<Vec<FallbackRecord>> {
        Ok(self.fallback.recent(disposition, limit).await?)
    }
}
