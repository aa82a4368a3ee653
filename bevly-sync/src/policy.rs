//! Resync and discard policy
//!
//! Both rules are pure functions of the injected clock, so tests move time
//! with a [`ManualClock`](bevly_common::time::ManualClock) instead of
//! sleeping.

use bevly_common::config::SyncConfig;
use bevly_common::time::{days, Clock, SystemClock};
use bevly_common::{Beverage, Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    resync_interval: Duration,
    discard_threshold: Duration,
    clock: Arc<dyn Clock>,
}

impl SyncPolicy {
    /// Fails unless `discard_threshold` exceeds `resync_interval`
    pub fn new(
        resync_interval: Duration,
        discard_threshold: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if discard_threshold <= resync_interval {
            return Err(Error::Config(format!(
                "discard threshold ({}d) must exceed resync interval ({}d)",
                discard_threshold.num_days(),
                resync_interval.num_days()
            )));
        }
        Ok(Self {
            resync_interval,
            discard_threshold,
            clock,
        })
    }

    pub fn from_config(config: &SyncConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(
            days(config.resync_interval_days),
            days(config.discard_threshold_days),
            clock,
        )
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn resync_interval(&self) -> Duration {
        self.resync_interval
    }

    pub fn discard_threshold(&self) -> Duration {
        self.discard_threshold
    }

    /// Sync times before this are stale
    pub fn resync_threshold_time(&self) -> DateTime<Utc> {
        self.now() - self.resync_interval
    }

    /// Unreferenced records last updated before this may be discarded
    pub fn discard_threshold_time(&self) -> DateTime<Utc> {
        self.now() - self.discard_threshold
    }

    /// Whether a beverage is due for enrichment
    ///
    /// Unreferenced beverages are never proactively enriched.
    pub fn needs_sync(&self, beverage: &Beverage, referenced: bool) -> bool {
        if !referenced {
            return false;
        }
        match beverage.sync_time {
            None => true,
            Some(sync_time) => sync_time < self.resync_threshold_time(),
        }
    }

    /// Whether a beverage may be garbage collected
    ///
    /// A record without an update time has never been persisted and is kept.
    pub fn eligible_for_discard(&self, beverage: &Beverage, referenced: bool) -> bool {
        if referenced {
            return false;
        }
        match beverage.updated_at {
            None => false,
            Some(updated_at) => updated_at < self.discard_threshold_time(),
        }
    }
}

impl Default for SyncPolicy {
    /// 3 day resync, 35 day discard, wall clock
    fn default() -> Self {
        Self {
            resync_interval: days(3),
            discard_threshold: days(35),
            clock: Arc::new(SystemClock),
        }
    }
}
