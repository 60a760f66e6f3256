use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy applied to each activity call.
///
/// `max_attempts` counts the first try. The delay before attempt `n + 1` is
/// `initial_interval * backoff_coefficient^(n - 1)`, capped at
/// `maximum_interval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_interval,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, value: u32) -> Self {
        self.max_attempts = value;
        self
    }

    pub fn with_initial_interval(mut self, value: Duration) -> Self {
        self.initial_interval = value;
        self
    }

    pub fn with_backoff_coefficient(mut self, value: f64) -> Self {
        self.backoff_coefficient = value;
        self
    }

    pub fn with_maximum_interval(mut self, value: Duration) -> Self {
        self.maximum_interval = value;
        self
    }

    /// A policy always allows at least one attempt.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff to wait after `attempt` failed, before the next one starts.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let coefficient = if self.backoff_coefficient.is_finite() {
            self.backoff_coefficient.max(1.0)
        } else {
            1.0
        };
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_interval.as_secs_f64() * coefficient.powi(exponent);
        let cap = self.maximum_interval.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            self.maximum_interval
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
