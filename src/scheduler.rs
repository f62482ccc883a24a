/// Fixed-interval tick source for the sampler worker.
///
/// The first tick fires one full interval after the scheduler starts, never at
/// time zero. A slow consumer sees at most one pending tick: missed periods are
/// coalesced rather than queued.
use crate::config::ConfigError;
use std::num::NonZeroU64;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Sampling interval in whole seconds. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval(NonZeroU64);

impl Interval {
    /// Validate a raw seconds value. Zero is a configuration error.
    pub fn from_secs(secs: u64) -> Result<Self, ConfigError> {
        NonZeroU64::new(secs)
            .map(Self)
            .ok_or(ConfigError::InvalidInterval { secs })
    }

    pub fn as_secs(&self) -> u64 {
        self.0.get()
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0.get())
    }
}

pub struct Scheduler {
    inner: time::Interval,
}

impl Scheduler {
    /// Start the clock now. The first tick is due at `now + interval`.
    pub fn start(interval: Interval) -> Self {
        let period = interval.as_duration();
        let mut inner = time::interval_at(Instant::now() + period, period);
        inner.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { inner }
    }

    /// Wait for the next tick. Cancel-safe, so it can sit in a `select!`.
    pub async fn tick(&mut self) {
        self.inner.tick().await;
    }

    #[allow(dead_code)]
    pub fn period(&self) -> Duration {
        self.inner.period()
    }
}
