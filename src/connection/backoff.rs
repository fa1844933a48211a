//! Reconnect delay arithmetic.
//!
//! `delay(n) = min(60s, base * factor^(n-1))`, optionally scaled by a uniform
//! random factor in `[0.8, 1.2]`. Attempts are counted from 1.

use rand::Rng;
use std::time::Duration;

use crate::config::ConnectionConfig;

/// Hard ceiling on the pre-jitter reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub const DEFAULT_FACTOR: f64 = 2.0;

pub const JITTER_MIN: f64 = 0.8;
pub const JITTER_MAX: f64 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    factor: f64,
    jitter: bool,
}

impl Backoff {
    /// A factor that would not grow the delay (≤ 1, NaN, infinite) is
    /// replaced by [`DEFAULT_FACTOR`].
    pub fn new(base: Duration, factor: f64, jitter: bool) -> Self {
        let factor = if factor.is_finite() && factor > 1.0 {
            factor
        } else {
            DEFAULT_FACTOR
        };
        Self {
            base,
            factor,
            jitter,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(
            config.base_retry_delay(),
            config.backoff_factor,
            config.jitter_enabled,
        )
    }

    /// Pre-jitter delay for `attempt` (1-based; 0 is treated as 1).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.factor.powi(exponent);
        // powi overflows to infinity for large exponents; min() absorbs it.
        Duration::from_secs_f64(secs.min(MAX_BACKOFF.as_secs_f64()))
    }

    /// Delay to sleep before the next connect after `attempt` failures.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter {
            Self::jittered(delay, &mut rand::thread_rng())
        } else {
            delay
        }
    }

    pub fn jittered<R: Rng>(delay: Duration, rng: &mut R) -> Duration {
        delay.mul_f64(rng.gen_range(JITTER_MIN..=JITTER_MAX))
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}
