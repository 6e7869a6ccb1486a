//! Backoff policy for a single identifier
//!
//! Rate-limit responses grow the delay by `factor`, transient network faults
//! by the gentler `transient_factor`; both are capped at `max`. The retry
//! loop gives up once the attempt count or the elapsed budget is spent.

use crate::config::BackoffConfig;
use std::time::Duration;

/// Reason recorded when an identifier runs out of retries
pub const MAX_RETRIES_REASON: &str = "max retries exceeded";

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    factor: f64,
    transient_factor: f64,
    max: Duration,
    transient_pause_cap: Duration,
    max_attempts: u32,
    max_elapsed: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_ms),
            factor: config.factor,
            transient_factor: config.transient_factor,
            max: Duration::from_millis(config.max_ms),
            transient_pause_cap: Duration::from_millis(config.transient_pause_cap_ms),
            max_attempts: config.max_attempts,
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
        }
    }

    /// Backoff used for the first retry of an identifier
    pub fn initial(&self) -> Duration {
        self.initial.min(self.max)
    }

    /// Next backoff after a rate-limit response: `min(current * factor, max)`
    pub fn after_rate_limit(&self, current: Duration) -> Duration {
        self.scale(current, self.factor)
    }

    /// Next backoff after a transient fault: `min(current * transient_factor, max)`
    pub fn after_transient(&self, current: Duration) -> Duration {
        self.scale(current, self.transient_factor)
    }

    /// Pause before retrying a transient fault: `min(cap, current / 2)`
    pub fn transient_pause(&self, current: Duration) -> Duration {
        (current / 2).min(self.transient_pause_cap)
    }

    /// True once `attempts` or the time budget is used up
    ///
    /// `elapsed` should include the pause about to be taken, so the loop
    /// never sleeps past its budget.
    pub fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        attempts >= self.max_attempts || elapsed > self.max_elapsed
    }

    /// Successive rate-limit sleeps for one identifier
    pub fn rate_limit_delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial()), move |d| Some(self.after_rate_limit(*d)))
    }

    fn scale(&self, current: Duration, factor: f64) -> Duration {
        let max_ms = self.max.as_millis() as f64;
        let scaled = (current.as_millis() as f64 * factor).round().min(max_ms);
        Duration::from_millis(scaled as u64)
    }
}
