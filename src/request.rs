//! Request and response types exchanged with the dispatcher and the transport.

use crate::bucket_id::BucketId;
use crate::client_bucket::ClientBucket;
use crate::clock::instant_after;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which failures a request absorbs by retrying.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetryMode(u8);

impl RetryMode {
    /// Fail on the first problem.
    pub const NONE: RetryMode = RetryMode(0);
    /// Retry transport timeouts.
    pub const RETRY_TIMEOUTS: RetryMode = RetryMode(1);
    /// Wait out local quota starvation instead of failing with `RateLimited`.
    pub const RETRY_RATE_LIMIT: RetryMode = RetryMode(1 << 1);
    /// Retry `502 Bad Gateway`.
    pub const RETRY_502: RetryMode = RetryMode(1 << 2);
    /// All of the above.
    pub const ALWAYS: RetryMode = RetryMode(0b111);

    pub fn contains(self, other: RetryMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for RetryMode {
    fn default() -> Self {
        RetryMode::ALWAYS
    }
}

impl BitOr for RetryMode {
    type Output = RetryMode;
    fn bitor(self, rhs: RetryMode) -> RetryMode {
        RetryMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for RetryMode {
    fn bitor_assign(&mut self, rhs: RetryMode) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for RetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::RETRY_TIMEOUTS) {
            names.push("RETRY_TIMEOUTS");
        }
        if self.contains(Self::RETRY_RATE_LIMIT) {
            names.push("RETRY_RATE_LIMIT");
        }
        if self.contains(Self::RETRY_502) {
            names.push("RETRY_502");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "RetryMode({})", names.join(" | "))
    }
}

/// One unit of work submitted to the dispatcher.
///
/// Built once by the caller and treated as immutable afterwards.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    bucket_id: BucketId,
    client_bucket: Option<&'static ClientBucket>,
    headers: HeaderMap,
    body: Option<Bytes>,
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
    retry_mode: Option<RetryMode>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>, bucket_id: BucketId) -> Self {
        Self {
            method,
            path: path.into(),
            bucket_id,
            client_bucket: None,
            headers: HeaderMap::new(),
            body: None,
            deadline: None,
            cancel: None,
            retry_mode: None,
        }
    }

    /// Use the static quota for `id` instead of trusting response headers.
    ///
    /// Panics if `id` is not in the [`ClientBucket`] table.
    pub fn with_client_bucket(mut self, id: &str) -> Self {
        self.client_bucket = Some(ClientBucket::get(id));
        self
    }

    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Absolute time after which the request fails instead of waiting.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(instant_after(Instant::now(), timeout))
    }

    /// Caller-owned cancellation signal.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
        self.retry_mode = Some(mode);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bucket_id(&self) -> &BucketId {
        &self.bucket_id
    }

    pub fn client_bucket(&self) -> Option<&'static ClientBucket> {
        self.client_bucket
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub fn retry_mode(&self) -> Option<RetryMode> {
        self.retry_mode
    }

    pub(crate) fn fill_defaults(&mut self, timeout: Option<Duration>, mode: RetryMode) {
        if self.deadline.is_none() {
            self.deadline = timeout.map(|t| instant_after(Instant::now(), t));
        }
        if self.retry_mode.is_none() {
            self.retry_mode = Some(mode);
        }
    }
}

/// What the transport returned.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) =
            (http::HeaderName::from_bytes(name.as_bytes()), http::HeaderValue::from_str(value))
        {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
