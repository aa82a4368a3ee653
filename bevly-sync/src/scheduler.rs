//! Recurring sync and garbage collection timers
//!
//! Startup fires one blocking trigger so the first pass is queued before
//! anything else happens; after that a timer fires non-blocking triggers,
//! which the orchestrator coalesces when a pass is already pending.

use crate::gc::GarbageCollector;
use crate::orchestrator::SyncOrchestrator;
use bevly_common::config::SyncConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Timer periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub sync_interval: Duration,
    pub gc_interval: Duration,
}

impl ScheduleConfig {
    pub fn from_sync_config(config: &SyncConfig) -> Self {
        Self {
            sync_interval: Duration::from_secs(config.interval_minutes * 60),
            gc_interval: Duration::from_secs(config.gc_interval_hours * 3600),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::from_sync_config(&SyncConfig::default())
    }
}

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    cancel: CancellationToken,
    timers: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Trigger an immediate sync, then schedule the recurring ones
    pub async fn start(
        orchestrator: Arc<SyncOrchestrator>,
        gc: Arc<GarbageCollector>,
        schedule: ScheduleConfig,
    ) -> Self {
        orchestrator.trigger_sync(true).await;

        let cancel = CancellationToken::new();

        info!("Scheduling sync every {:?}", schedule.sync_interval);
        let sync_timer = {
            let orchestrator = orchestrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticks = interval_at(
                    Instant::now() + schedule.sync_interval,
                    schedule.sync_interval,
                );
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticks.tick() => {
                            orchestrator.trigger_sync(false).await;
                        }
                    }
                }
                debug!("Sync timer stopped");
            })
        };

        info!("Scheduling garbage collection every {:?}", schedule.gc_interval);
        let gc_timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticks =
                    interval_at(Instant::now() + schedule.gc_interval, schedule.gc_interval);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticks.tick() => {
                            // Failure is logged by the collector; retried next tick
                            let _ = gc.sweep().await;
                        }
                    }
                }
                debug!("GC timer stopped");
            })
        };

        Self {
            orchestrator,
            cancel,
            timers: vec![sync_timer, gc_timer],
        }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Stop the timers, then let the worker finish its current pass
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for timer in self.timers {
            let _ = timer.await;
        }
        self.orchestrator.shutdown().await;
        info!("Sync scheduler stopped");
    }
}
