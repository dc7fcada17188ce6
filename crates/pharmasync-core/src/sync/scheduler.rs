//! Sync triggering: startup, fixed interval, and manual refresh.
//!
//! Every trigger lands on the same [`SyncEngine::sync`] entry point. A
//! request or tick arriving mid-pass is dropped, not queued behind it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{SyncEngine, SyncOutcome};
use crate::config::SyncConfig;
use crate::remote::RemoteStore;

/// Handle for requesting a manual sync.
#[derive(Debug, Clone, Default)]
pub struct SyncTrigger {
    notify: Arc<Notify>,
    busy: Arc<AtomicBool>,
}

impl SyncTrigger {
    /// Ask for a pass now. Ignored while a pass is running.
    pub fn request(&self) {
        if self.busy.load(Ordering::Acquire) {
            tracing::debug!("Sync already in progress; dropping request");
            return;
        }
        self.notify.notify_one();
    }

    fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Release);
    }

    async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// Drives a [`SyncEngine`] until shut down.
pub struct SyncScheduler<'a, R> {
    engine: &'a SyncEngine<R>,
    interval: Option<Duration>,
    offline: AtomicBool,
    trigger: SyncTrigger,
}

impl<'a, R: RemoteStore> SyncScheduler<'a, R> {
    pub fn new(engine: &'a SyncEngine<R>, interval: Option<Duration>) -> Self {
        Self {
            engine,
            interval,
            offline: AtomicBool::new(false),
            trigger: SyncTrigger::default(),
        }
    }

    pub fn from_config(engine: &'a SyncEngine<R>, config: &SyncConfig) -> Self {
        let scheduler = Self::new(engine, config.sync_interval);
        scheduler.set_offline_mode(config.offline_mode);
        scheduler
    }

    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// While set, passes are skipped and the indicator reads offline.
    pub fn set_offline_mode(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    /// Run a pass now, then on every tick or request until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = self.interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            self.trigger.set_busy(true);
            self.run_once().await;
            self.trigger.set_busy(false);
            // The next tick is a full period after this pass ended.
            if let Some(ticker) = ticker.as_mut() {
                ticker.reset();
            }

            tokio::select! {
                () = &mut shutdown => break,
                () = self.trigger.requested() => {
                    tracing::debug!("Manual sync requested");
                }
                () = next_tick(&mut ticker) => {}
            }
        }
        tracing::debug!("Sync scheduler stopped");
    }

    /// Run a single pass, honoring offline mode.
    pub async fn run_once(&self) {
        if self.is_offline() {
            tracing::debug!("Offline mode; skipping sync pass");
            self.engine.mark_offline();
            return;
        }

        // Failures are logged by the engine and retried on the next trigger.
        if let Ok(SyncOutcome::Skipped) = self.engine.sync().await {
            tracing::debug!("Previous sync pass still running");
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
