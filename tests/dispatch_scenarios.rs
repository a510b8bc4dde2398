mod common;

use async_trait::async_trait;
use common::{get, ok, settle, status, ScriptedTransport, Step};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tollgate::{
    BucketId, DispatchError, Dispatcher, DispatcherConfig, GatewayBackoff, Jitter,
    RecordingSleeper, Request, Response, RetryMode, Transport, TransportError, MAX_RATE_LIMIT_WAIT,
};

fn bucket(path: &str) -> BucketId {
    BucketId::new(http::Method::GET, path)
}

#[tokio::test(start_paused = true)]
async fn window_of_two_admits_two_of_three_concurrent_sends() {
    let transport = Arc::new(ScriptedTransport::new().script(
        "/w",
        vec![
            Step::Reply(ok(2, 1, "1")),
            Step::Delay(Duration::from_secs(1), ok(2, 1, "1")),
            Step::Delay(Duration::from_secs(1), ok(2, 0, "1")),
        ],
    ));
    let dispatcher = Dispatcher::new(Arc::clone(&transport));

    // Learn the window, then let it refill.
    dispatcher.send(get("/w")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let snap = dispatcher.bucket_snapshot(&bucket("/w")).unwrap();
    assert_eq!(snap.window_count, 2);
    assert_eq!(snap.available_permits, 2);

    let start = Instant::now();
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let d = dispatcher.clone();
            tokio::spawn(async move { d.send(get("/w")).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.total(), 3, "only two of three may be in flight");
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(transport.total(), 3, "the third caller still waits");

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, StatusCode::OK);
    }
    let calls = transport.calls_to("/w");
    assert_eq!(calls.len(), 4);
    assert!(calls[3] - start >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn local_429_waits_retry_after_then_succeeds() {
    let limited = status(429)
        .with_header("Retry-After", "0.75")
        .with_header("X-RateLimit-Reset", "4102444800")
        .with_header("X-RateLimit-Scope", "user");
    let transport = Arc::new(
        ScriptedTransport::new().script("/r", vec![Step::Reply(limited), Step::Reply(ok(10, 9, "1"))]),
    );
    let dispatcher = Dispatcher::new(Arc::clone(&transport));

    let resp = dispatcher.send(get("/r")).await.unwrap();
    assert_eq!(resp.status, StatusCode::OK);

    let calls = transport.calls_to("/r");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1] - calls[0], Duration::from_millis(750));

    let snap = dispatcher.bucket_snapshot(&bucket("/r")).unwrap();
    assert_eq!(snap.window_count, 10);
    assert_eq!(snap.available_permits, 9);
}

#[tokio::test(start_paused = true)]
async fn bad_gateway_is_retried_with_backoff() {
    let transport = Arc::new(ScriptedTransport::new().script(
        "/g",
        vec![Step::Reply(status(502)), Step::Reply(status(502)), Step::Reply(ok(5, 4, "1"))],
    ));
    let sleeper = RecordingSleeper::new();
    let config = DispatcherConfig::builder().with_sleeper(sleeper.clone()).build().unwrap();
    let dispatcher = Dispatcher::builder(Arc::clone(&transport)).config(config).build();

    let resp = dispatcher.send(get("/g")).await.unwrap();
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(transport.total(), 3);

    let delays = sleeper.calls();
    assert_eq!(delays.len(), 2);
    assert!(delays[0] <= Duration::from_millis(250));
    assert!(delays[1] <= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn bad_gateway_backoff_grows_on_the_timer() {
    let transport = Arc::new(ScriptedTransport::new().script(
        "/g",
        vec![Step::Reply(status(502)), Step::Reply(status(502)), Step::Reply(ok(5, 4, "1"))],
    ));
    let backoff = GatewayBackoff::exponential(Duration::from_millis(100), Duration::from_secs(1))
        .unwrap()
        .with_jitter(Jitter::None);
    let config = DispatcherConfig::builder().bad_gateway_backoff(backoff).build().unwrap();
    let dispatcher = Dispatcher::builder(Arc::clone(&transport)).config(config).build();

    dispatcher.send(get("/g")).await.unwrap();
    let calls = transport.calls_to("/g");
    assert_eq!(calls[1] - calls[0], Duration::from_millis(100));
    assert_eq!(calls[2] - calls[1], Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn bad_gateway_fails_without_retry_flag() {
    let transport = ScriptedTransport::new().script("/g", vec![Step::Reply(status(502))]);
    let dispatcher = Dispatcher::new(transport);
    let err = dispatcher
        .send(get("/g").with_retry_mode(RetryMode::RETRY_RATE_LIMIT))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
}

#[tokio::test(start_paused = true)]
async fn global_429_blocks_every_bucket() {
    let global = status(429)
        .with_header("Retry-After", "1")
        .with_header("X-RateLimit-Global", "true");
    let transport = Arc::new(ScriptedTransport::new().script("/a", vec![Step::Reply(global)]));
    let dispatcher = Dispatcher::new(Arc::clone(&transport));

    let start = Instant::now();
    let a = {
        let d = dispatcher.clone();
        tokio::spawn(async move { d.send(get("/a")).await })
    };
    settle().await;
    assert!(dispatcher.gate().is_paused());

    let b = {
        let d = dispatcher.clone();
        tokio::spawn(async move { d.send(get("/b")).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(transport.calls_to("/b").is_empty(), "no bucket may send during a global pause");

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert!(transport.calls_to("/b")[0] - start >= Duration::from_secs(1));
    assert!(transport.calls_to("/a")[1] - start >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn global_pause_catches_callers_already_holding_a_permit() {
    let transport = Arc::new(ScriptedTransport::new());
    let dispatcher = Dispatcher::new(Arc::clone(&transport));
    dispatcher.gate().pause(Duration::from_secs(2));

    let start = Instant::now();
    dispatcher.send(get("/c")).await.unwrap();
    assert!(transport.calls_to("/c")[0] - start >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn deadline_before_known_reset_fails_fast() {
    let transport = Arc::new(ScriptedTransport::new().script("/f", vec![Step::Reply(ok(1, 0, "10"))]));
    let dispatcher = Dispatcher::new(Arc::clone(&transport));
    dispatcher.send(get("/f")).await.unwrap();

    let start = Instant::now();
    let err = dispatcher
        .send(get("/f").with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited(), "{err}");
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(err.rate_limit_wait(), Some(Duration::from_secs(10)));
    assert_eq!(transport.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_reset_with_short_deadline_fails_fast() {
    let transport = Arc::new(
        ScriptedTransport::new().script("/u", vec![Step::Delay(Duration::from_secs(2), ok(1, 0, "1"))]),
    );
    let dispatcher = Dispatcher::new(Arc::clone(&transport));
    let first = {
        let d = dispatcher.clone();
        tokio::spawn(async move { d.send(get("/u")).await })
    };
    settle().await;

    let err = dispatcher
        .send(get("/u").with_timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.rate_limit_wait(), Some(Duration::from_millis(500)));
    first.await.unwrap().unwrap();
    assert_eq!(transport.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn starvation_without_rate_limit_retry_fails_immediately() {
    let transport = ScriptedTransport::new().script("/n", vec![Step::Reply(ok(1, 0, "5"))]);
    let dispatcher = Dispatcher::new(transport);
    dispatcher.send(get("/n")).await.unwrap();

    let err = dispatcher.send(get("/n").with_retry_mode(RetryMode::NONE)).await.unwrap_err();
    assert!(matches!(err, DispatchError::RateLimited { .. }));
}

#[tokio::test(start_paused = true)]
async fn application_errors_are_not_retried() {
    let forbidden = status(403).with_body(r#"{"code": 50013, "message": "Missing Permissions"}"#);
    let transport = Arc::new(ScriptedTransport::new().script("/e", vec![Step::Reply(forbidden)]));
    let dispatcher = Dispatcher::new(Arc::clone(&transport));

    let err = dispatcher.send(get("/e")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    assert_eq!(err.message(), Some("Missing Permissions"));
    assert!(matches!(err, DispatchError::Http { code: Some(50013), .. }));
    assert_eq!(transport.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_timeouts_follow_retry_mode() {
    let transport = Arc::new(ScriptedTransport::new().script(
        "/t",
        vec![Step::Fail(TransportError::Timeout), Step::Reply(ok(5, 4, "1"))],
    ));
    let dispatcher = Dispatcher::new(Arc::clone(&transport));
    dispatcher.send(get("/t")).await.unwrap();
    assert_eq!(transport.total(), 2);

    transport.push("/t", Step::Fail(TransportError::Timeout));
    let err = dispatcher
        .send(get("/t").with_retry_mode(RetryMode::RETRY_RATE_LIMIT))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Transport(TransportError::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn client_bucket_uses_static_window() {
    let transport = Arc::new(ScriptedTransport::new());
    let dispatcher = Dispatcher::new(Arc::clone(&transport));
    let id = BucketId::from(tollgate::client_bucket::SEND_EDIT);
    let request = tollgate::Request::new(http::Method::POST, "/channels/1/messages", id.clone())
        .with_client_bucket(tollgate::client_bucket::SEND_EDIT);

    // The default reply carries a limit, which upgrades the static window.
    dispatcher.send(request).await.unwrap();
    let snap = dispatcher.bucket_snapshot(&id).unwrap();
    assert_eq!(snap.window_count, 100);
}

#[tokio::test(start_paused = true)]
async fn absurd_local_retry_after_is_capped() {
    let limited = status(429)
        .with_header("Retry-After", "10000000000000000000")
        .with_header("X-RateLimit-Reset-After", "10000000000000000000")
        .with_header("X-RateLimit-Reset", "10000000000000000000");
    let transport = Arc::new(ScriptedTransport::new().script("/huge", vec![Step::Reply(limited)]));
    let dispatcher = Dispatcher::new(Arc::clone(&transport));

    let err = dispatcher
        .send(get("/huge").with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited(), "{err}");
    assert_eq!(err.rate_limit_wait(), Some(MAX_RATE_LIMIT_WAIT));

    // The bucket is still usable afterwards.
    let again = dispatcher.send(get("/huge")).await.unwrap_err();
    assert!(again.is_rate_limited(), "{again}");
    let snap = dispatcher.bucket_snapshot(&bucket("/huge")).unwrap();
    assert!(snap.reset_in.unwrap() > MAX_RATE_LIMIT_WAIT - Duration::from_secs(1));
    assert_eq!(transport.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn absurd_global_retry_after_is_capped() {
    let global = status(429)
        .with_header("Retry-After", "10000000000000000000")
        .with_header("X-RateLimit-Global", "true");
    let transport = Arc::new(ScriptedTransport::new().script("/huge", vec![Step::Reply(global)]));
    let dispatcher = Dispatcher::new(Arc::clone(&transport));

    let err = dispatcher
        .send(get("/huge").with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");

    let remaining = dispatcher.gate().remaining().unwrap();
    assert!(remaining <= MAX_RATE_LIMIT_WAIT);
    assert!(remaining > MAX_RATE_LIMIT_WAIT - Duration::from_secs(2));

    let other = dispatcher
        .send(get("/other").with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(other.is_timeout(), "{other}");
    assert_eq!(transport.total(), 1);
}

/// Server enforcing fixed windows, answering 429 once a window is overdrawn.
struct WindowedServer {
    limit: u32,
    window: Duration,
    current: Mutex<(Option<Instant>, u32)>,
    calls: Mutex<Vec<Instant>>,
    rejected: AtomicUsize,
}

impl WindowedServer {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            current: Mutex::new((None, 0)),
            calls: Mutex::new(Vec::new()),
            rejected: AtomicUsize::new(0),
        }
    }
}

fn seconds(d: Duration) -> String {
    format!("{}.{:03}", d.as_secs(), d.subsec_millis())
}

#[async_trait]
impl Transport for WindowedServer {
    async fn send(&self, _request: &Request) -> Result<Response, TransportError> {
        let now = Instant::now();
        self.calls.lock().unwrap().push(now);
        let mut current = self.current.lock().unwrap();
        let previous = current.0;
        let start = match previous {
            Some(start) if now < start + self.window => start,
            _ => {
                *current = (Some(now), 0);
                now
            }
        };
        current.1 += 1;
        let left = seconds(start + self.window - now);
        if current.1 > self.limit {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Ok(status(429)
                .with_header("Retry-After", &left)
                .with_header("X-RateLimit-Limit", &self.limit.to_string())
                .with_header("X-RateLimit-Remaining", "0"));
        }
        Ok(ok(self.limit, self.limit - current.1, &left))
    }
}

#[tokio::test(start_paused = true)]
async fn many_callers_never_overdraw_a_window() {
    let server = Arc::new(WindowedServer::new(3, Duration::from_secs(1)));
    let dispatcher = Dispatcher::new(Arc::clone(&server));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let d = dispatcher.clone();
            tokio::spawn(async move { d.send(get("/busy")).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, StatusCode::OK);
    }

    assert_eq!(server.rejected.load(Ordering::SeqCst), 0);
    let mut calls = server.calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls.len(), 20);
    for (i, &at) in calls.iter().enumerate() {
        let in_window = calls[i..].iter().take_while(|&&c| c < at + Duration::from_secs(1)).count();
        assert!(in_window <= 3, "{in_window} calls within one second of call {i}");
    }
    assert!(calls[19] - calls[0] >= Duration::from_secs(6));
}
