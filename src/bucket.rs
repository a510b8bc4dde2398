//! Per-route limiter and the dispatch loop that runs inside it.
//!
//! Every `send` walks the same states:
//!
//! 1. wait for the [`GlobalGate`] to open
//! 2. take a permit, or wait for the window to refill
//! 3. invoke the transport
//! 4. classify the response, reconcile local state, and either return or loop
//!
//! `permits` is decremented outside the lock on the hot path and may go
//! negative while callers are starved. Everything else (window size, reset
//! time, the refill timer) changes only under the bucket mutex. At most one
//! refill task exists per bucket at any time; it re-reads `reset_at` each time
//! it wakes, so a later update moves it instead of racing it.

use crate::bucket_id::BucketId;
use crate::client_bucket::ClientBucket;
use crate::clock::{instant_after, MAX_RATE_LIMIT_WAIT};
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, TransportError};
use crate::gate::GlobalGate;
use crate::rate_limit_info::{measure_lag, RateLimitInfo};
use crate::request::{Request, Response, RetryMode};
use crate::telemetry::{DispatchEvent, RateLimitEvent, RetryEvent};
use crate::transport::Transport;
use http::StatusCode;
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, UNIX_EPOCH};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Point-in-time view of a bucket, handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub id: BucketId,
    /// Permits granted per window.
    pub window_count: u32,
    /// Negative while callers are waiting.
    pub available_permits: i64,
    /// Time until the scheduled refill, if one is pending.
    pub reset_in: Option<Duration>,
    /// Server-side bucket hash from `X-RateLimit-Bucket`.
    pub server_bucket: Option<String>,
}

/// Everything a bucket borrows from its dispatcher for one `send`.
pub(crate) struct SendContext<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) gate: &'a GlobalGate,
    pub(crate) config: &'a DispatcherConfig,
    /// Epoch token captured when the send started.
    pub(crate) epoch: CancellationToken,
    pub(crate) emit: &'a (dyn Fn(DispatchEvent) + Send + Sync),
}

#[derive(Debug)]
pub(crate) struct Bucket {
    id: BucketId,
    client_bucket: Option<&'static ClientBucket>,
    permits: AtomicI64,
    created: Instant,
    // Nanoseconds after `created`.
    last_attempt: AtomicU64,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    window_count: u32,
    reset_at: Option<Instant>,
    refill_pending: bool,
    server_bucket: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

impl Bucket {
    /// A fresh bucket. Discovered buckets start with a single permit; client
    /// buckets start from their static table entry.
    pub(crate) fn new(id: BucketId, client_bucket: Option<&'static ClientBucket>) -> Self {
        let window_count = client_bucket.map(|cb| cb.window_count).unwrap_or(1);
        Self {
            id,
            client_bucket,
            permits: AtomicI64::new(i64::from(window_count)),
            created: Instant::now(),
            last_attempt: AtomicU64::new(0),
            state: Mutex::new(State {
                window_count,
                reset_at: None,
                refill_pending: false,
                server_bucket: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> &BucketId {
        &self.id
    }

    pub(crate) fn snapshot(&self) -> BucketSnapshot {
        let state = self.lock();
        let now = Instant::now();
        BucketSnapshot {
            id: self.id.clone(),
            window_count: state.window_count,
            available_permits: self.permits.load(Ordering::Acquire),
            reset_in: state.reset_at.map(|at| at.saturating_duration_since(now)),
            server_bucket: state.server_bucket.clone(),
        }
    }

    /// True when nothing is scheduled and the last attempt is older than `ttl`.
    pub(crate) fn is_idle(&self, ttl: Duration) -> bool {
        let state = self.lock();
        if state.refill_pending || state.reset_at.is_some() {
            return false;
        }
        let last = self.created + Duration::from_nanos(self.last_attempt.load(Ordering::Acquire));
        Instant::now().saturating_duration_since(last) >= ttl
    }

    pub(crate) async fn send(
        self: &Arc<Self>,
        request: &Request,
        cx: &SendContext<'_>,
        attempts: &mut u32,
    ) -> Result<Response, DispatchError> {
        let mode = request.retry_mode().unwrap_or(cx.config.default_retry_mode());
        let waiter = Waiter {
            started: Instant::now(),
            deadline: request.deadline(),
            epoch: &cx.epoch,
            caller: request.cancel_token(),
        };
        let mut reported_starvation = false;
        let mut gateway_retries = 0u32;
        let mut timeout_retries = 0u32;

        'dispatch: loop {
            waiter.check()?;

            self.wait_global(cx.gate, &waiter).await?;
            self.acquire(mode, cx, &waiter, &mut reported_starvation).await?;

            loop {
                // A global pause may have started while this caller was parked.
                if let Err(err) = self.wait_global(cx.gate, &waiter).await {
                    self.settle_unreported(cx.config);
                    return Err(err);
                }
                self.touch();
                *attempts += 1;
                let result = match waiter.run(cx.transport.send(request)).await {
                    Ok(result) => result,
                    Err(err) => {
                        self.settle_unreported(cx.config);
                        return Err(err);
                    }
                };

                let response = match result {
                    Ok(response) => response,
                    Err(TransportError::Timeout) if mode.contains(RetryMode::RETRY_TIMEOUTS) => {
                        self.settle_unreported(cx.config);
                        timeout_retries += 1;
                        let delay = cx.config.timeout_retry_wait();
                        debug!(target: "tollgate::bucket", bucket = %self.id, attempt = timeout_retries, "transport timed out, retrying");
                        (cx.emit)(DispatchEvent::Retry(RetryEvent::TransportTimeout {
                            bucket: self.id.clone(),
                            attempt: timeout_retries,
                            delay,
                        }));
                        waiter.sleep_until(instant_after(Instant::now(), delay)).await?;
                        continue 'dispatch;
                    }
                    Err(err) => {
                        self.settle_unreported(cx.config);
                        return Err(err.into());
                    }
                };

                if response.status == StatusCode::BAD_GATEWAY {
                    if !mode.contains(RetryMode::RETRY_502) {
                        self.settle_unreported(cx.config);
                        return Err(http_error(&response));
                    }
                    gateway_retries += 1;
                    let delay = cx.config.bad_gateway_backoff().next_delay(gateway_retries);
                    debug!(target: "tollgate::bucket", bucket = %self.id, attempt = gateway_retries, delay_ms = millis(delay), "bad gateway, retrying");
                    (cx.emit)(DispatchEvent::Retry(RetryEvent::BadGateway {
                        bucket: self.id.clone(),
                        attempt: gateway_retries,
                        delay,
                    }));
                    if let Err(err) = waiter.run(cx.config.sleeper().sleep(delay)).await {
                        self.settle_unreported(cx.config);
                        return Err(err);
                    }
                    continue;
                }

                let info = RateLimitInfo::from_headers(&response.headers);
                let lag = measure_lag(&response.headers, cx.config.clock().now());

                if response.status == StatusCode::TOO_MANY_REQUESTS {
                    if info.is_global {
                        let pause = info
                            .retry_after
                            .or(info.reset_after)
                            .unwrap_or(cx.config.fallback_reset())
                            .min(MAX_RATE_LIMIT_WAIT);
                        cx.gate.pause(pause);
                        self.update(&info, lag, true, cx.config);
                        (cx.emit)(self.rate_limit_event(Some(pause), true));
                    } else {
                        let wait = self.update(&info, lag, true, cx.config);
                        debug!(target: "tollgate::bucket", bucket = %self.id, wait_ms = millis(wait), "server rate limited request");
                        let retry_after = info.retry_after.map_or(wait, |after| after.min(MAX_RATE_LIMIT_WAIT));
                        (cx.emit)(self.rate_limit_event(Some(retry_after), false));
                    }
                    continue 'dispatch;
                }

                self.update(&info, lag, false, cx.config);
                if response.status.is_success() {
                    return Ok(response);
                }
                return Err(http_error(&response));
            }
        }
    }

    async fn wait_global(&self, gate: &GlobalGate, waiter: &Waiter<'_>) -> Result<(), DispatchError> {
        while let Some(until) = gate.paused_until() {
            trace!(target: "tollgate::bucket", bucket = %self.id, "waiting on global rate limit");
            waiter.sleep_until(until).await?;
        }
        Ok(())
    }

    async fn acquire(
        self: &Arc<Self>,
        mode: RetryMode,
        cx: &SendContext<'_>,
        waiter: &Waiter<'_>,
        reported: &mut bool,
    ) -> Result<(), DispatchError> {
        loop {
            if self.permits.fetch_sub(1, Ordering::AcqRel) > 0 {
                return Ok(());
            }

            if !*reported {
                *reported = true;
                (cx.emit)(self.rate_limit_event(None, false));
            }

            let now = Instant::now();
            let reset_at = {
                let mut state = self.lock();
                if state.reset_at.is_some_and(|at| at <= now) {
                    self.refill_locked(&mut state);
                    continue;
                }
                state.reset_at
            };

            let (target, wait) = match reset_at {
                Some(at) => (at, at - now),
                None => {
                    let wait = cx.config.unknown_reset_wait();
                    (instant_after(now, wait), wait)
                }
            };

            if !mode.contains(RetryMode::RETRY_RATE_LIMIT) {
                return Err(DispatchError::RateLimited { bucket: self.id.clone(), wait });
            }
            if waiter.deadline.is_some_and(|deadline| target > deadline) {
                debug!(target: "tollgate::bucket", bucket = %self.id, wait_ms = millis(wait), "quota wait exceeds deadline");
                return Err(DispatchError::RateLimited { bucket: self.id.clone(), wait });
            }

            trace!(target: "tollgate::bucket", bucket = %self.id, wait_ms = millis(wait), "sleeping pre-emptively");
            waiter.sleep_until(target).await?;
        }
    }

    /// Reconcile local state with one response. Returns the time until the
    /// scheduled refill.
    pub(crate) fn update(
        self: &Arc<Self>,
        info: &RateLimitInfo,
        lag: Option<i64>,
        is_429: bool,
        config: &DispatcherConfig,
    ) -> Duration {
        let now = Instant::now();
        let reset_at = instant_after(now, self.reset_delay(info, lag, config));
        let mut state = self.lock();

        if info.bucket.is_some() {
            state.server_bucket.clone_from(&info.bucket);
        }

        match info.limit {
            None if self.client_bucket.is_some() => {
                if state.window_count != 0 {
                    debug!(target: "tollgate::bucket", bucket = %self.id, "no limit reported, closing window");
                }
                state.window_count = 0;
                self.permits.fetch_min(0, Ordering::AcqRel);
            }
            Some(limit) if limit != state.window_count => {
                let permits = if is_429 { 0 } else { info.remaining.unwrap_or(limit).min(limit) };
                debug!(target: "tollgate::bucket", bucket = %self.id, from = state.window_count, to = limit, permits, "upgrading window");
                state.window_count = limit;
                self.permits.store(i64::from(permits), Ordering::Release);
            }
            _ => {}
        }
        if is_429 {
            self.permits.fetch_min(0, Ordering::AcqRel);
        }

        self.schedule_locked(&mut state, reset_at);
        state.reset_at.map(|at| at.saturating_duration_since(now)).unwrap_or_default()
    }

    /// Time until the window resets, capped at [`MAX_RATE_LIMIT_WAIT`].
    fn reset_delay(&self, info: &RateLimitInfo, lag: Option<i64>, config: &DispatcherConfig) -> Duration {
        self.uncapped_reset_delay(info, lag, config).min(MAX_RATE_LIMIT_WAIT)
    }

    fn uncapped_reset_delay(&self, info: &RateLimitInfo, lag: Option<i64>, config: &DispatcherConfig) -> Duration {
        if let Some(after) = info.retry_after {
            return after;
        }
        if !config.use_system_clock() {
            if let Some(after) = info.reset_after {
                return after;
            }
        }
        if let Some(reset) = info.reset {
            let reset_ms = reset.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i128;
            let local_ms =
                config.clock().now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i128;
            let left = reset_ms + i128::from(lag.unwrap_or(0)) - local_ms;
            return Duration::from_millis(u64::try_from(left.max(0)).unwrap_or(u64::MAX));
        }
        if let Some(after) = info.reset_after {
            return after;
        }
        match self.client_bucket {
            Some(cb) => cb.window,
            None => config.fallback_reset(),
        }
    }

    /// An invoke ended without a server report. Make sure a refill will still
    /// happen so the consumed permit comes back.
    fn settle_unreported(self: &Arc<Self>, config: &DispatcherConfig) {
        let mut state = self.lock();
        if state.reset_at.is_none() {
            let at = instant_after(Instant::now(), config.fallback_reset());
            self.schedule_locked(&mut state, at);
        }
    }

    fn schedule_locked(self: &Arc<Self>, state: &mut State, at: Instant) {
        if state.reset_at.is_some_and(|current| current >= at) {
            return;
        }
        state.reset_at = Some(at);
        let nanos = at.saturating_duration_since(self.created).as_nanos();
        self.last_attempt
            .fetch_max(u64::try_from(nanos).unwrap_or(u64::MAX), Ordering::AcqRel);
        if !state.refill_pending {
            state.refill_pending = true;
            tokio::spawn(refill(Arc::downgrade(self)));
        }
    }

    fn refill_locked(&self, state: &mut State) {
        let permits = state.window_count.max(1);
        self.permits.store(i64::from(permits), Ordering::Release);
        state.reset_at = None;
        trace!(target: "tollgate::bucket", bucket = %self.id, permits, "window refilled");
    }

    fn touch(&self) {
        let nanos = Instant::now().saturating_duration_since(self.created).as_nanos();
        self.last_attempt
            .fetch_max(u64::try_from(nanos).unwrap_or(u64::MAX), Ordering::AcqRel);
    }

    fn rate_limit_event(&self, retry_after: Option<Duration>, global: bool) -> DispatchEvent {
        DispatchEvent::RateLimit(RateLimitEvent {
            bucket: self.id.clone(),
            snapshot: self.snapshot(),
            retry_after,
            global,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("bucket state poisoned")
    }
}

/// The single refill timer of a bucket. Exits once nothing is scheduled or
/// the bucket has been dropped.
async fn refill(bucket: Weak<Bucket>) {
    loop {
        let at = {
            let Some(bucket) = bucket.upgrade() else { return };
            let mut state = bucket.lock();
            let scheduled = state.reset_at;
            match scheduled {
                None => {
                    state.refill_pending = false;
                    return;
                }
                Some(at) if at <= Instant::now() => {
                    bucket.refill_locked(&mut state);
                    state.refill_pending = false;
                    return;
                }
                Some(at) => at,
            }
        };
        tokio::time::sleep_until(at).await;
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn http_error(response: &Response) -> DispatchError {
    let body = serde_json::from_slice::<ErrorBody>(&response.body).ok();
    let (code, message) = match body {
        Some(body) => (body.code, body.message),
        None => (None, None),
    };
    DispatchError::Http { status: response.status, code, message }
}

/// Bounds every suspension point by the request deadline, the caller's token
/// and the dispatcher epoch.
struct Waiter<'a> {
    started: Instant,
    deadline: Option<Instant>,
    epoch: &'a CancellationToken,
    caller: Option<&'a CancellationToken>,
}

impl Waiter<'_> {
    fn check(&self) -> Result<(), DispatchError> {
        if self.epoch.is_cancelled() || self.caller.is_some_and(|t| t.is_cancelled()) {
            return Err(DispatchError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(self.timed_out());
        }
        Ok(())
    }

    fn timed_out(&self) -> DispatchError {
        DispatchError::TimedOut { elapsed: self.started.elapsed() }
    }

    async fn sleep_until(&self, at: Instant) -> Result<(), DispatchError> {
        self.run(tokio::time::sleep_until(at)).await
    }

    async fn run<F: Future>(&self, fut: F) -> Result<F::Output, DispatchError> {
        let caller = async {
            match self.caller {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.epoch.cancelled() => Err(DispatchError::Cancelled),
            _ = caller => Err(DispatchError::Cancelled),
            out = fut => Ok(out),
            _ = deadline => Err(self.timed_out()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_bucket::SEND_EDIT;

    fn bucket() -> Arc<Bucket> {
        Arc::new(Bucket::new(BucketId::from("GET /test"), None))
    }

    fn info(limit: Option<u32>, remaining: Option<u32>) -> RateLimitInfo {
        RateLimitInfo { limit, remaining, ..Default::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn new_discovered_bucket_has_one_permit() {
        let snap = bucket().snapshot();
        assert_eq!(snap.window_count, 1);
        assert_eq!(snap.available_permits, 1);
        assert_eq!(snap.reset_in, None);
    }

    #[tokio::test(start_paused = true)]
    async fn client_bucket_starts_from_table() {
        let b = Bucket::new(BucketId::from(SEND_EDIT), Some(ClientBucket::get(SEND_EDIT)));
        assert_eq!(b.snapshot().window_count, 10);
        assert_eq!(b.snapshot().available_permits, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn upgrade_is_idempotent() {
        let config = DispatcherConfig::default();
        let b = bucket();
        b.update(&info(Some(5), Some(3)), None, false, &config);
        let first = b.snapshot();
        assert_eq!(first.window_count, 5);
        assert_eq!(first.available_permits, 3);

        b.update(&info(Some(5), Some(3)), None, false, &config);
        let second = b.snapshot();
        assert_eq!(second.window_count, first.window_count);
        assert_eq!(second.available_permits, first.available_permits);
    }

    #[tokio::test(start_paused = true)]
    async fn upgrade_on_429_zeroes_permits() {
        let b = bucket();
        b.update(&info(Some(5), Some(3)), None, true, &DispatcherConfig::default());
        assert_eq!(b.snapshot().window_count, 5);
        assert_eq!(b.snapshot().available_permits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_limit_collapses_client_bucket() {
        let b = Arc::new(Bucket::new(BucketId::from(SEND_EDIT), Some(ClientBucket::get(SEND_EDIT))));
        let wait = b.update(&RateLimitInfo::default(), None, false, &DispatcherConfig::default());
        let snap = b.snapshot();
        assert_eq!(snap.window_count, 0);
        assert!(snap.available_permits <= 0);
        assert_eq!(wait, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_beats_reset() {
        let b = bucket();
        let info = RateLimitInfo {
            retry_after: Some(Duration::from_millis(750)),
            reset: Some(UNIX_EPOCH + Duration::from_secs(10_000_000_000)),
            ..Default::default()
        };
        let wait = b.update(&info, Some(0), true, &DispatcherConfig::default());
        assert_eq!(wait, Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_is_corrected_for_lag() {
        let clock = crate::clock::ManualClock::new(UNIX_EPOCH + Duration::from_secs(100));
        let config = DispatcherConfig::builder().with_clock(clock).build().unwrap();
        let info = RateLimitInfo {
            reset: Some(UNIX_EPOCH + Duration::from_secs(102)),
            ..Default::default()
        };
        // Local clock runs 500ms ahead of the server.
        let wait = bucket().update(&info, Some(500), false, &config);
        assert_eq!(wait, Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_after_preferred_without_system_clock() {
        let config = DispatcherConfig::builder().use_system_clock(false).build().unwrap();
        let info = RateLimitInfo {
            reset: Some(UNIX_EPOCH),
            reset_after: Some(Duration::from_millis(1_250)),
            ..Default::default()
        };
        assert_eq!(bucket().update(&info, None, false, &config), Duration::from_millis(1_250));
    }

    #[tokio::test(start_paused = true)]
    async fn no_signal_uses_fallback() {
        let wait = bucket().update(&RateLimitInfo::default(), None, false, &DispatcherConfig::default());
        assert_eq!(wait, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn latest_reset_wins_and_refill_restores_window() {
        let config = DispatcherConfig::default();
        let b = bucket();
        let after = |ms| RateLimitInfo {
            limit: Some(4),
            remaining: Some(0),
            retry_after: Some(Duration::from_millis(ms)),
            ..Default::default()
        };
        b.update(&after(2_000), None, false, &config);
        b.update(&after(1_000), None, false, &config);
        b.update(&after(3_000), None, false, &config);
        assert_eq!(b.snapshot().reset_in, Some(Duration::from_millis(3_000)));

        tokio::time::sleep(Duration::from_millis(2_001)).await;
        let mid = b.snapshot();
        assert_eq!(mid.available_permits, 0);
        assert!(mid.reset_in.is_some());

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let done = b.snapshot();
        assert_eq!(done.available_permits, 4);
        assert_eq!(done.window_count, 4);
        assert_eq!(done.reset_in, None);
        assert!(!b.lock().refill_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_reset_headers_are_capped() {
        let config = DispatcherConfig::default();
        let b = bucket();
        let huge_retry = RateLimitInfo {
            limit: Some(2),
            remaining: Some(0),
            retry_after: Some(Duration::from_secs(u64::MAX)),
            ..Default::default()
        };
        assert_eq!(b.update(&huge_retry, None, true, &config), MAX_RATE_LIMIT_WAIT);
        let huge_after = RateLimitInfo { reset_after: Some(Duration::MAX), ..Default::default() };
        assert_eq!(b.update(&huge_after, None, false, &config), MAX_RATE_LIMIT_WAIT);

        let snap = b.snapshot();
        assert_eq!(snap.window_count, 2);
        assert_eq!(snap.reset_in, Some(MAX_RATE_LIMIT_WAIT));
    }

    #[tokio::test(start_paused = true)]
    async fn far_future_reset_is_capped() {
        let clock = crate::clock::ManualClock::new(UNIX_EPOCH + Duration::from_secs(100));
        let config = DispatcherConfig::builder().with_clock(clock).build().unwrap();
        let info = RateLimitInfo {
            reset: Some(UNIX_EPOCH + Duration::from_secs(1 << 40)),
            ..Default::default()
        };
        assert_eq!(bucket().update(&info, Some(0), false, &config), MAX_RATE_LIMIT_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_only_after_ttl_with_nothing_scheduled() {
        let b = bucket();
        b.update(&RateLimitInfo::default(), None, false, &DispatcherConfig::default());
        assert!(!b.is_idle(Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert!(!b.is_idle(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(b.is_idle(Duration::from_secs(60)));
    }

    #[test]
    fn error_body_is_decoded() {
        let resp = Response::new(StatusCode::FORBIDDEN)
            .with_body(r#"{"code": 50013, "message": "Missing Permissions"}"#);
        let err = http_error(&resp);
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(err.message(), Some("Missing Permissions"));

        let garbage = http_error(&Response::new(StatusCode::BAD_REQUEST).with_body("<html>"));
        assert_eq!(garbage.message(), None);
    }
}
