//! Error types surfaced by the dispatch engine.
//!
//! Rate-limit bookkeeping never produces errors: malformed headers degrade to
//! conservative defaults. Only the outcomes below reach callers.
use crate::bucket_id::BucketId;
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`Transport`](crate::Transport) before any status code was seen.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport gave up waiting for the remote side.
    #[error("transport timed out")]
    Timeout,
    /// Any other I/O or protocol failure.
    #[error("transport failed: {0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wrap an arbitrary error as a non-retryable transport failure.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TransportError::Other(Arc::new(err))
    }
}

/// Caller-visible failure of [`Dispatcher::send`](crate::Dispatcher::send).
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Waiting for quota would overrun the request deadline.
    #[error("bucket {bucket} is rate limited; next permit in {wait:?}")]
    RateLimited { bucket: BucketId, wait: Duration },
    /// The server answered with a non-retryable status.
    #[error("http {status}{}", fmt_message(.code, .message))]
    Http { status: StatusCode, code: Option<i64>, message: Option<String> },
    /// Cancelled by the caller or by a dispatcher reset.
    #[error("request cancelled")]
    Cancelled,
    /// The request deadline passed while waiting.
    #[error("request timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },
    /// The transport failed and the retry mode does not absorb it.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

fn fmt_message(code: &Option<i64>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!(": {message} (code {code})"),
        (None, Some(message)) => format!(": {message}"),
        (Some(code), None) => format!(" (code {code})"),
        (None, None) => String::new(),
    }
}

impl DispatchError {
    /// Check if the call failed fast on quota.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
    /// Check if the request deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
    /// Check if the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
    /// Status code for `Http` failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
    /// Server-supplied message for `Http` failures.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Http { message, .. } => message.as_deref(),
            _ => None,
        }
    }
    /// Time until the next permit for `RateLimited` failures.
    pub fn rate_limit_wait(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { wait, .. } => Some(*wait),
            _ => None,
        }
    }
}

/// Errors produced while building a [`DispatcherConfig`](crate::DispatcherConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("unknown_reset_wait must be > 0")]
    ZeroUnknownResetWait,
    #[error("fallback_reset must be > 0")]
    ZeroFallbackReset,
    #[error("sweep_interval must be > 0")]
    ZeroSweepInterval,
    #[error("backoff max ({max:?}) must be >= base ({base:?})")]
    BackoffMaxLessThanBase { base: Duration, max: Duration },
}
