//! Exponential backoff with jitter
//!
//! The delay before retry `n` (1-based, counting the attempt that just
//! failed) is
//!
//! ```text
//! capped = min(base_delay * multiplier^(n - 1), max_delay)
//! ```
//!
//! followed by jitter. [`Jitter::Full`] draws uniformly from `[0, capped]`,
//! which spreads concurrent callers that failed at the same moment across the
//! whole window instead of letting them retry in lockstep.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult};
use crate::resilience::retry::RetryPolicy;

/// Randomization applied to the capped delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// Use the capped delay as is
    None,
    /// Uniform in `[0, capped]`
    #[default]
    Full,
    /// Uniform in `[capped / 2, capped]`
    Equal,
}

impl Jitter {
    /// Apply jitter to `delay` using `rng`
    pub fn apply<R: Rng + ?Sized>(self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Self::None => delay,
            Self::Full => delay.mul_f64(rng.gen_range(0.0..=1.0)),
            Self::Equal => {
                let half = delay / 2;
                half + half.mul_f64(rng.gen_range(0.0..=1.0))
            }
        }
    }
}

/// Delay schedule shared by every retry of a policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt, before jitter
    pub base_delay: Duration,

    /// Upper bound applied before jitter
    pub max_delay: Duration,

    /// Growth factor per attempt
    pub multiplier: f64,

    /// Randomization strategy
    pub jitter: Jitter,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: Jitter::Full,
        }
    }
}

impl Backoff {
    /// Check multiplier and bounds
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "multiplier",
                format!("must be a finite number >= 1.0, got {}", self.multiplier),
            ));
        }

        if self.base_delay > self.max_delay {
            return Err(ConfigError::invalid(
                "base_delay",
                format!(
                    "must not exceed max_delay ({:?} > {:?})",
                    self.base_delay, self.max_delay
                ),
            ));
        }

        Ok(())
    }

    /// Pre-jitter delay after `attempt` failed
    ///
    /// Attempt `0` is treated as `1`. Saturates at `max_delay` for any attempt
    /// number, including ones whose exponential term overflows `f64`.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();

        if !secs.is_finite() || secs >= max_secs {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// Jittered delay after `attempt` failed, using the thread-local RNG
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(attempt, &mut rand::thread_rng())
    }

    /// Jittered delay after `attempt` failed, using the given RNG
    pub fn next_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.jitter.apply(self.capped_delay(attempt), rng)
    }
}

/// Jittered delay to wait after `attempt` failed under `policy`
pub fn next_delay<E>(attempt: u32, policy: &RetryPolicy<E>) -> Duration {
    policy.backoff().next_delay(attempt)
}

/// Pre-jitter delay after `attempt` failed under `policy`
pub fn capped_delay<E>(attempt: u32, policy: &RetryPolicy<E>) -> Duration {
    policy.backoff().capped_delay(attempt)
}
