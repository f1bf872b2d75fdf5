//! Poll-interval backoff after failed fetches

use std::time::Duration;

/// Smallest extension over the base interval once a fetch has failed
const MIN_EXTENSION: Duration = Duration::from_secs(1);

/// Exponential backoff state, reset by the first successful cycle.
///
/// After `n` consecutive failures the delay is `base * factor^n`, capped at
/// `max`, and always strictly longer than `base`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffState {
    base: Duration,
    factor: f64,
    max: Duration,
    consecutive_failures: u32,
}

impl BackoffState {
    pub fn new(base: Duration, factor: f64, max: Duration) -> Self {
        Self {
            base,
            factor: factor.max(1.0),
            max,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the next cycle, without jitter
    pub fn current_delay(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return self.base;
        }
        let floor = self.base + MIN_EXTENSION;
        let ceiling = self.max.max(floor);
        let exponent = self.consecutive_failures.min(32) as i32;
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= ceiling.as_secs_f64() {
            return ceiling;
        }
        Duration::from_secs_f64(scaled).max(floor)
    }

    /// Count a failed cycle and return the resulting delay
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current_delay()
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }
}
