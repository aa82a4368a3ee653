//! Per-source randomized request pacing
//!
//! One [`Throttle`] is owned by each external source. Every outbound call to
//! that source goes through [`Throttle::delay_invocation`] first, so the gap
//! between consecutive calls lands somewhere in `[min_delay, max_delay]`
//! rather than at a fixed, easily fingerprinted period.

use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default minimum gap between calls to one source
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(4500);

/// Default maximum gap between calls to one source
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(18000);

#[derive(Debug)]
pub struct Throttle {
    name: String,
    min_delay: Duration,
    max_delay: Duration,
    /// Held across the sleep so concurrent callers queue behind each other
    last_invocation: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Create a throttle; a `max_delay` below `min_delay` is raised to it
    pub fn new(name: impl Into<String>, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            name: name.into(),
            min_delay,
            max_delay: max_delay.max(min_delay),
            last_invocation: Mutex::new(None),
        }
    }

    pub fn from_millis(name: impl Into<String>, min_ms: u64, max_ms: u64) -> Self {
        Self::new(name, Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// 4.5s to 18s between calls
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_MIN_DELAY, DEFAULT_MAX_DELAY)
    }

    /// Throttle that never sleeps
    pub fn disabled(name: impl Into<String>) -> Self {
        Self::new(name, Duration::ZERO, Duration::ZERO)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Wait until this source may be called again
    ///
    /// The first call never sleeps. Returns the time actually slept.
    pub async fn delay_invocation(&self) -> Duration {
        let mut last = self.last_invocation.lock().await;

        let mut slept = Duration::ZERO;
        if let Some(last_time) = *last {
            let sleep_for = self.random_sleep_duration(last_time.elapsed());
            if !sleep_for.is_zero() {
                debug!(
                    throttle = %self.name,
                    "Throttle sleeping {:.2}s",
                    sleep_for.as_secs_f64()
                );
                tokio::time::sleep(sleep_for).await;
                slept = sleep_for;
            }
        }

        *last = Some(Instant::now());
        slept
    }

    /// How long to sleep given the time since the previous call
    ///
    /// Uniform over the window that puts the total gap in
    /// `[min_delay, max_delay]`; zero once `max_delay` has already passed.
    pub fn random_sleep_duration(&self, since_last: Duration) -> Duration {
        let min = self.min_delay.saturating_sub(since_last);
        let max = self.max_delay.saturating_sub(since_last);
        if max.is_zero() {
            return Duration::ZERO;
        }
        if min == max {
            return min;
        }
        rand::thread_rng().gen_range(min..max)
    }
}
