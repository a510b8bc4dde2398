//! Delay policy for retrying `502 Bad Gateway` responses.
//!
//! Attempt semantics: attempt `1` is the first retry. Delays grow exponentially
//! from `base`, are capped at `max`, and are then randomised by [`Jitter`].
//!
//! ```rust
//! use std::time::Duration;
//! use tollgate::backoff::{GatewayBackoff, Jitter};
//!
//! let backoff = GatewayBackoff::exponential(Duration::from_millis(100), Duration::from_secs(1))
//!     .unwrap()
//!     .with_jitter(Jitter::None);
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(3), Duration::from_millis(400));
//! assert_eq!(backoff.delay(10), Duration::from_secs(1));
//! ```

use crate::error::BuildError;
use rand::{rng, Rng};
use std::time::Duration;

/// Randomisation applied on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Exact delay.
    None,
    /// Uniform in `[0, delay]`.
    #[default]
    Full,
    /// Uniform in `[delay/2, delay]`.
    Equal,
}

impl Jitter {
    /// Apply jitter using the thread-local RNG.
    pub fn apply(self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Apply jitter with a caller-supplied RNG.
    pub fn apply_with_rng<R: Rng>(self, delay: Duration, rng: &mut R) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Duration::ZERO;
        }
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal => Duration::from_millis(rng.random_range(millis / 2..=millis)),
        }
    }
}

/// Exponential, capped, jittered delay between bad-gateway retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayBackoff {
    base: Duration,
    max: Duration,
    jitter: Jitter,
}

impl GatewayBackoff {
    /// Exponential growth from `base`, capped at `max`, full jitter.
    pub fn exponential(base: Duration, max: Duration) -> Result<Self, BuildError> {
        if max < base {
            return Err(BuildError::BackoffMaxLessThanBase { base, max });
        }
        Ok(Self { base, max, jitter: Jitter::Full })
    }

    /// Retry back-to-back with no delay.
    pub fn immediate() -> Self {
        Self { base: Duration::ZERO, max: Duration::ZERO, jitter: Jitter::None }
    }

    /// Replace the jitter strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = 2u128.saturating_pow(attempt - 1);
        let nanos = self.base.as_nanos().saturating_mul(multiplier).min(self.max.as_nanos());
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Jittered delay before retry number `attempt`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.delay(attempt))
    }
}

impl Default for GatewayBackoff {
    fn default() -> Self {
        Self { base: Duration::from_millis(250), max: Duration::from_secs(30), jitter: Jitter::Full }
    }
}
