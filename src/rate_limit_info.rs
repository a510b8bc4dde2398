//! Rate-limit header parsing.
//!
//! [`RateLimitInfo::from_headers`] is pure: it never fails and never invents
//! values. A header that is missing or malformed maps to `None`, so that a
//! reported `remaining: Some(0)` stays distinguishable from "not reported".
//!
//! Recognised headers:
//! - `X-RateLimit-Limit`, `X-RateLimit-Remaining`: unsigned integers
//! - `X-RateLimit-Reset`: unix epoch seconds, fractional allowed
//! - `X-RateLimit-Reset-After`, `Retry-After`: seconds, fractional allowed
//! - `X-RateLimit-Global: true` or `X-RateLimit-Scope: global`
//! - `X-RateLimit-Bucket`: opaque server-side bucket hash
//!
//! Example
//! ```rust
//! use http::HeaderMap;
//! use std::time::Duration;
//! use tollgate::RateLimitInfo;
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
//! headers.insert("retry-after", "0.75".parse().unwrap());
//! let info = RateLimitInfo::from_headers(&headers);
//! assert_eq!(info.remaining, Some(0));
//! assert_eq!(info.limit, None);
//! assert_eq!(info.retry_after, Some(Duration::from_millis(750)));
//! ```

use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const SCOPE: &str = "x-ratelimit-scope";
pub const BUCKET: &str = "x-ratelimit-bucket";
pub const RETRY_AFTER: &str = "retry-after";
pub const DATE: &str = "date";

/// Snapshot of the rate-limit metadata carried by one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Window size reported by the server.
    pub limit: Option<u32>,
    /// Permits left in the current window.
    pub remaining: Option<u32>,
    /// Absolute reset time, in the server's clock.
    pub reset: Option<SystemTime>,
    /// Relative reset time.
    pub reset_after: Option<Duration>,
    /// Relative retry delay; more precise than `reset` when present.
    pub retry_after: Option<Duration>,
    /// The limit applies to every route.
    pub is_global: bool,
    /// Server-side bucket hash.
    pub bucket: Option<String>,
}

impl RateLimitInfo {
    /// Parse the rate-limit headers of a response.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let is_global = header_str(headers, GLOBAL)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
            || header_str(headers, SCOPE).map(|v| v.eq_ignore_ascii_case("global")).unwrap_or(false);

        Self {
            limit: header_str(headers, LIMIT).and_then(|v| v.parse().ok()),
            remaining: header_str(headers, REMAINING).and_then(|v| v.parse().ok()),
            reset: header_str(headers, RESET)
                .and_then(parse_seconds)
                .and_then(|since_epoch| UNIX_EPOCH.checked_add(since_epoch)),
            reset_after: header_str(headers, RESET_AFTER).and_then(parse_seconds),
            retry_after: header_str(headers, RETRY_AFTER).and_then(parse_seconds),
            is_global,
            bucket: header_str(headers, BUCKET).filter(|v| !v.is_empty()).map(str::to_owned),
        }
    }

    /// True when the response carried no usable rate-limit signal at all.
    pub fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.remaining.is_none()
            && self.reset.is_none()
            && self.reset_after.is_none()
            && self.retry_after.is_none()
            && !self.is_global
    }
}

/// Clock skew between this host and the server, in milliseconds.
///
/// Positive means the local clock is ahead of the server's. Server-reported
/// reset timestamps are shifted by this amount before use.
pub fn measure_lag(headers: &HeaderMap, local_now: SystemTime) -> Option<i64> {
    let date = header_str(headers, DATE)?;
    let server = chrono::DateTime::parse_from_rfc2822(date).ok()?;
    let local = chrono::DateTime::<chrono::Utc>::from(local_now);
    Some((local - server.with_timezone(&chrono::Utc)).num_milliseconds())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Parse non-negative decimal seconds exactly, down to the nanosecond.
fn parse_seconds(value: &str) -> Option<Duration> {
    let (whole, frac) = match value.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (value, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(whole) || !is_digits(frac) {
        return None;
    }
    let secs: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos: u32 = 0;
    for (i, digit) in frac.bytes().take(9).enumerate() {
        nanos += u32::from(digit - b'0') * 10u32.pow(8 - i as u32);
    }
    Some(Duration::new(secs, nanos))
}
