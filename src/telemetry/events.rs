use crate::bucket::BucketSnapshot;
use crate::bucket_id::BucketId;
use http::StatusCode;
use std::fmt;
use std::time::Duration;

#[cfg(feature = "telemetry-json")]
use serde_json::json;

/// Events emitted by the dispatcher while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A bucket hit its quota, locally or by server report.
    RateLimit(RateLimitEvent),
    /// A transient failure is about to be retried.
    Retry(RetryEvent),
    /// Final outcome of one `send`.
    Request(RequestOutcome),
}

/// Quota exhaustion observed on a bucket.
///
/// `retry_after` is `None` for pre-emptive throttling, where the bucket ran out
/// of permits before the server said anything.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitEvent {
    pub bucket: BucketId,
    pub snapshot: BucketSnapshot,
    pub retry_after: Option<Duration>,
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// The server answered 502.
    BadGateway { bucket: BucketId, attempt: u32, delay: Duration },
    /// The transport timed out.
    TransportTimeout { bucket: BucketId, attempt: u32, delay: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Success { bucket: BucketId, attempts: u32, duration: Duration },
    Failure { bucket: BucketId, attempts: u32, duration: Duration, kind: FailureKind },
}

/// Coarse classification of a failed `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Http(StatusCode),
    Cancelled,
    TimedOut,
    Transport,
}

impl fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchEvent::RateLimit(event) => write!(f, "RateLimit::{}", event),
            DispatchEvent::Retry(event) => write!(f, "Retry::{}", event),
            DispatchEvent::Request(event) => write!(f, "Request::{}", event),
        }
    }
}

impl fmt::Display for RateLimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = if self.global { "Global" } else { "Bucket" };
        match self.retry_after {
            Some(after) => write!(f, "{}({}, retry_after={:?})", scope, self.bucket, after),
            None => write!(
                f,
                "{}({}, pre-emptive, permits={}/{})",
                scope, self.bucket, self.snapshot.available_permits, self.snapshot.window_count
            ),
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::BadGateway { bucket, attempt, delay } => {
                write!(f, "BadGateway({}, #{}, delay={:?})", bucket, attempt, delay)
            }
            RetryEvent::TransportTimeout { bucket, attempt, delay } => {
                write!(f, "TransportTimeout({}, #{}, delay={:?})", bucket, attempt, delay)
            }
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOutcome::Success { bucket, attempts, duration } => {
                write!(f, "Success({}, attempts={}, duration={:?})", bucket, attempts, duration)
            }
            RequestOutcome::Failure { bucket, attempts, duration, kind } => write!(
                f,
                "Failure({}, {}, attempts={}, duration={:?})",
                bucket, kind, attempts, duration
            ),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::RateLimited => write!(f, "rate_limited"),
            FailureKind::Http(status) => write!(f, "http_{}", status.as_u16()),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::TimedOut => write!(f, "timed_out"),
            FailureKind::Transport => write!(f, "transport"),
        }
    }
}

#[cfg(feature = "telemetry-json")]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

/// Render a [`DispatchEvent`] as a flat JSON object.
#[cfg(feature = "telemetry-json")]
pub fn event_to_json(event: &DispatchEvent) -> serde_json::Value {
    match event {
        DispatchEvent::RateLimit(e) => json!({
            "kind": if e.global { "global_rate_limit" } else { "rate_limit" },
            "bucket": e.bucket.as_str(),
            "retry_after_ms": e.retry_after.map(|d| clamp_u64(d.as_millis())),
            "window_count": e.snapshot.window_count,
            "available_permits": e.snapshot.available_permits,
            "reset_in_ms": e.snapshot.reset_in.map(|d| clamp_u64(d.as_millis())),
        }),
        DispatchEvent::Retry(RetryEvent::BadGateway { bucket, attempt, delay }) => json!({
            "kind": "bad_gateway_retry",
            "bucket": bucket.as_str(),
            "attempt": *attempt,
            "delay_ms": clamp_u64(delay.as_millis()),
        }),
        DispatchEvent::Retry(RetryEvent::TransportTimeout { bucket, attempt, delay }) => json!({
            "kind": "transport_timeout_retry",
            "bucket": bucket.as_str(),
            "attempt": *attempt,
            "delay_ms": clamp_u64(delay.as_millis()),
        }),
        DispatchEvent::Request(RequestOutcome::Success { bucket, attempts, duration }) => json!({
            "kind": "request_success",
            "bucket": bucket.as_str(),
            "attempts": *attempts,
            "duration_ms": clamp_u64(duration.as_millis()),
        }),
        DispatchEvent::Request(RequestOutcome::Failure { bucket, attempts, duration, kind }) => {
            json!({
                "kind": "request_failure",
                "bucket": bucket.as_str(),
                "attempts": *attempts,
                "duration_ms": clamp_u64(duration.as_millis()),
                "failure": kind.to_string(),
            })
        }
    }
}
