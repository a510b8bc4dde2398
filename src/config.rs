//! Dispatcher configuration.
//!
//! ```rust
//! use std::time::Duration;
//! use tollgate::{DispatcherConfig, RetryMode};
//!
//! let config = DispatcherConfig::builder()
//!     .default_timeout(Some(Duration::from_secs(5)))
//!     .default_retry_mode(RetryMode::RETRY_502)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.default_timeout(), Some(Duration::from_secs(5)));
//! ```

use crate::backoff::GatewayBackoff;
use crate::clock::{Clock, SystemClock};
use crate::error::BuildError;
use crate::request::RetryMode;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::sync::Arc;
use std::time::Duration;

/// Validated settings shared by every bucket of a dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    default_timeout: Option<Duration>,
    default_retry_mode: RetryMode,
    unknown_reset_wait: Duration,
    timeout_retry_wait: Duration,
    fallback_reset: Duration,
    use_system_clock: bool,
    bad_gateway_backoff: GatewayBackoff,
    idle_ttl: Duration,
    sweep_interval: Duration,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl DispatcherConfig {
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::new()
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn default_retry_mode(&self) -> RetryMode {
        self.default_retry_mode
    }

    pub fn unknown_reset_wait(&self) -> Duration {
        self.unknown_reset_wait
    }

    pub fn timeout_retry_wait(&self) -> Duration {
        self.timeout_retry_wait
    }

    pub fn fallback_reset(&self) -> Duration {
        self.fallback_reset
    }

    pub fn use_system_clock(&self) -> bool {
        self.use_system_clock
    }

    pub fn bad_gateway_backoff(&self) -> &GatewayBackoff {
        &self.bad_gateway_backoff
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfigBuilder::new().into_config()
    }
}

/// Builder for [`DispatcherConfig`].
#[derive(Debug, Clone)]
pub struct DispatcherConfigBuilder {
    default_timeout: Option<Duration>,
    default_retry_mode: RetryMode,
    unknown_reset_wait: Duration,
    timeout_retry_wait: Duration,
    fallback_reset: Duration,
    use_system_clock: bool,
    bad_gateway_backoff: GatewayBackoff,
    idle_ttl: Duration,
    sweep_interval: Duration,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl DispatcherConfigBuilder {
    pub fn new() -> Self {
        Self {
            default_timeout: Some(Duration::from_secs(15)),
            default_retry_mode: RetryMode::ALWAYS,
            unknown_reset_wait: Duration::from_millis(500),
            timeout_retry_wait: Duration::from_millis(500),
            fallback_reset: Duration::from_secs(1),
            use_system_clock: true,
            bad_gateway_backoff: GatewayBackoff::default(),
            idle_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Deadline for requests that carry none. `None` leaves them unbounded.
    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_retry_mode(mut self, mode: RetryMode) -> Self {
        self.default_retry_mode = mode;
        self
    }

    /// Blind wait used when a bucket is starved and no reset time is known.
    pub fn unknown_reset_wait(mut self, wait: Duration) -> Self {
        self.unknown_reset_wait = wait;
        self
    }

    /// Pause before retrying a transport timeout.
    pub fn timeout_retry_wait(mut self, wait: Duration) -> Self {
        self.timeout_retry_wait = wait;
        self
    }

    /// Reset applied when a response carries no usable reset signal.
    pub fn fallback_reset(mut self, reset: Duration) -> Self {
        self.fallback_reset = reset;
        self
    }

    /// When false, `X-RateLimit-Reset-After` wins over the lag-corrected
    /// absolute reset.
    pub fn use_system_clock(mut self, enabled: bool) -> Self {
        self.use_system_clock = enabled;
        self
    }

    pub fn bad_gateway_backoff(mut self, backoff: GatewayBackoff) -> Self {
        self.bad_gateway_backoff = backoff;
        self
    }

    pub fn idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<DispatcherConfig, BuildError> {
        if self.unknown_reset_wait.is_zero() {
            return Err(BuildError::ZeroUnknownResetWait);
        }
        if self.fallback_reset.is_zero() {
            return Err(BuildError::ZeroFallbackReset);
        }
        if self.sweep_interval.is_zero() {
            return Err(BuildError::ZeroSweepInterval);
        }
        Ok(self.into_config())
    }

    fn into_config(self) -> DispatcherConfig {
        DispatcherConfig {
            default_timeout: self.default_timeout,
            default_retry_mode: self.default_retry_mode,
            unknown_reset_wait: self.unknown_reset_wait,
            timeout_retry_wait: self.timeout_retry_wait,
            fallback_reset: self.fallback_reset,
            use_system_clock: self.use_system_clock,
            bad_gateway_backoff: self.bad_gateway_backoff,
            idle_ttl: self.idle_ttl,
            sweep_interval: self.sweep_interval,
            clock: self.clock,
            sleeper: self.sleeper,
        }
    }
}

impl Default for DispatcherConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
