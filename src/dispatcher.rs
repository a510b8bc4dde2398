//! Entry point: routes requests to per-route buckets.
//!
//! The dispatcher owns three pieces of shared state:
//!
//! - the bucket registry, keyed by [`BucketId`] and filled lazily
//! - the [`GlobalGate`] every bucket consults before sending
//! - the cancellation scope, an upstream token plus a child "epoch" token
//!
//! Each `send` captures the epoch token current at the moment it starts.
//! [`Dispatcher::reset`] cancels that epoch and derives a fresh one, so callers
//! parked at that point fail with [`DispatchError::Cancelled`] while sends that
//! start afterwards are unaffected. Buckets survive a reset, so learned quotas
//! carry over a reconnect.
//!
//! ```rust
//! use http::{Method, StatusCode};
//! use tollgate::{BucketId, Dispatcher, Request, Response, TowerTransport, TransportError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = TowerTransport::new(tower::service_fn(|_req: Request| async {
//!     Ok::<_, TransportError>(
//!         Response::new(StatusCode::OK)
//!             .with_header("X-RateLimit-Limit", "5")
//!             .with_header("X-RateLimit-Remaining", "4")
//!             .with_header("X-RateLimit-Reset-After", "1"),
//!     )
//! }));
//! let dispatcher = Dispatcher::new(transport);
//!
//! let id = BucketId::new(Method::GET, "/gateway");
//! let response = dispatcher.send(Request::new(Method::GET, "/gateway", id.clone())).await.unwrap();
//! assert_eq!(response.status, StatusCode::OK);
//! assert_eq!(dispatcher.bucket_snapshot(&id).unwrap().window_count, 5);
//! # }
//! ```

use crate::bucket::{Bucket, BucketSnapshot, SendContext};
use crate::bucket_id::BucketId;
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::gate::GlobalGate;
use crate::request::{Request, Response};
use crate::telemetry::{
    emit_best_effort, DispatchEvent, FailureKind, NullSink, RateLimitEvent, RequestOutcome,
    TelemetrySink,
};
use crate::transport::Transport;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Rate-limit aware request dispatcher. Cheap to clone.
pub struct Dispatcher<T, S = NullSink> {
    inner: Arc<Inner<T, S>>,
}

struct Inner<T, S> {
    transport: T,
    sink: S,
    config: DispatcherConfig,
    gate: GlobalGate,
    buckets: RwLock<HashMap<BucketId, Arc<Bucket>>>,
    scope: Mutex<CancelScope>,
    shutdown: CancellationToken,
}

struct CancelScope {
    upstream: CancellationToken,
    epoch: CancellationToken,
}

impl CancelScope {
    fn new(upstream: CancellationToken) -> Self {
        let epoch = upstream.child_token();
        Self { upstream, epoch }
    }
}

impl<T, S> Clone for Dispatcher<T, S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T, S> fmt::Debug for Dispatcher<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.inner.buckets.read().map(|map| map.len()).unwrap_or_default();
        f.debug_struct("Dispatcher")
            .field("buckets", &buckets)
            .field("gate", &self.inner.gate)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<T> Dispatcher<T, NullSink>
where
    T: Transport,
{
    /// Dispatcher with default configuration and no telemetry.
    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: T) -> DispatcherBuilder<T, NullSink> {
        DispatcherBuilder {
            transport,
            sink: NullSink,
            config: DispatcherConfig::default(),
            gate: None,
            upstream: None,
        }
    }
}

impl<T, S> Dispatcher<T, S>
where
    T: Transport,
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    /// Send `request`, waiting on quota and retrying transient failures as its
    /// retry mode allows.
    pub async fn send(&self, mut request: Request) -> Result<Response, DispatchError> {
        let inner = &self.inner;
        request.fill_defaults(inner.config.default_timeout(), inner.config.default_retry_mode());

        let bucket = self.bucket_for(&request);
        let epoch = self.epoch();
        let emit = |event: DispatchEvent| self.emit(event);
        let cx = SendContext {
            transport: &inner.transport,
            gate: &inner.gate,
            config: &inner.config,
            epoch,
            emit: &emit,
        };

        let started = Instant::now();
        let mut attempts = 0;
        let result = bucket.send(&request, &cx, &mut attempts).await;
        let duration = started.elapsed();

        let outcome = match &result {
            Ok(_) => RequestOutcome::Success { bucket: bucket.id().clone(), attempts, duration },
            Err(err) => {
                debug!(target: "tollgate::dispatcher", bucket = %bucket.id(), error = %err, "request failed");
                RequestOutcome::Failure {
                    bucket: bucket.id().clone(),
                    attempts,
                    duration,
                    kind: failure_kind(err),
                }
            }
        };
        self.emit(DispatchEvent::Request(outcome));
        result
    }

    /// Report a rate-limit hit to observers. Never blocks and never fails.
    pub fn notify(&self, bucket: BucketId, snapshot: BucketSnapshot, retry_after: Option<Duration>) {
        self.emit(DispatchEvent::RateLimit(RateLimitEvent {
            bucket,
            snapshot,
            retry_after,
            global: false,
        }));
    }

    fn emit(&self, event: DispatchEvent) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(emit_best_effort(self.inner.sink.clone(), event));
            }
            Err(_) => {
                debug!(target: "tollgate::dispatcher", %event, "no runtime, dropping event");
            }
        }
    }
}

impl<T, S> Dispatcher<T, S> {
    /// Replace the upstream cancellation source.
    ///
    /// Sends already in flight keep the epoch they started with.
    pub fn set_cancel_token(&self, token: CancellationToken) {
        let mut scope = self.lock_scope();
        *scope = CancelScope::new(token);
    }

    /// Abort every in-flight wait and start a new epoch. Bucket state is kept.
    pub fn reset(&self) {
        let mut scope = self.lock_scope();
        scope.epoch.cancel();
        scope.epoch = scope.upstream.child_token();
        info!(target: "tollgate::dispatcher", "dispatch epoch reset");
    }

    /// Token of the current epoch.
    pub fn epoch(&self) -> CancellationToken {
        self.lock_scope().epoch.clone()
    }

    pub fn gate(&self) -> &GlobalGate {
        &self.inner.gate
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn bucket_snapshot(&self, id: &BucketId) -> Option<BucketSnapshot> {
        self.read_buckets().get(id).map(|bucket| bucket.snapshot())
    }

    /// Snapshots of every bucket, sorted by id.
    pub fn snapshots(&self) -> Vec<BucketSnapshot> {
        let mut all: Vec<_> = self.read_buckets().values().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn bucket_count(&self) -> usize {
        self.read_buckets().len()
    }

    /// Drop buckets idle for longer than `idle_ttl` with no refill pending and
    /// no send in progress. Returns how many were removed.
    pub fn sweep_idle(&self) -> usize {
        let ttl = self.inner.config.idle_ttl();
        let mut map = self.inner.buckets.write().expect("bucket registry poisoned");
        let before = map.len();
        map.retain(|_, bucket| Arc::strong_count(bucket) > 1 || !bucket.is_idle(ttl));
        let removed = before - map.len();
        if removed > 0 {
            debug!(target: "tollgate::dispatcher", removed, remaining = map.len(), "swept idle buckets");
        }
        removed
    }

    /// Stop housekeeping and cancel the current epoch.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.lock_scope().epoch.cancel();
    }

    fn bucket_for(&self, request: &Request) -> Arc<Bucket> {
        if let Some(bucket) = self.read_buckets().get(request.bucket_id()) {
            return Arc::clone(bucket);
        }
        let mut map = self.inner.buckets.write().expect("bucket registry poisoned");
        let bucket = map.entry(request.bucket_id().clone()).or_insert_with(|| {
            debug!(target: "tollgate::dispatcher", bucket = %request.bucket_id(), "creating bucket");
            Arc::new(Bucket::new(request.bucket_id().clone(), request.client_bucket()))
        });
        Arc::clone(bucket)
    }

    fn read_buckets(&self) -> std::sync::RwLockReadGuard<'_, HashMap<BucketId, Arc<Bucket>>> {
        self.inner.buckets.read().expect("bucket registry poisoned")
    }

    fn lock_scope(&self) -> std::sync::MutexGuard<'_, CancelScope> {
        self.inner.scope.lock().expect("cancel scope poisoned")
    }
}

impl<T, S> Dispatcher<T, S>
where
    T: Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    /// Run [`sweep_idle`](Self::sweep_idle) every `sweep_interval` until the
    /// dispatcher is dropped or shut down.
    pub fn spawn_housekeeping(&self) -> JoinHandle<()> {
        let weak: Weak<Inner<T, S>> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        let interval = self.inner.config.sweep_interval();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                let Some(inner) = weak.upgrade() else { return };
                Dispatcher { inner }.sweep_idle();
            }
        })
    }
}

fn failure_kind(err: &DispatchError) -> FailureKind {
    match err {
        DispatchError::RateLimited { .. } => FailureKind::RateLimited,
        DispatchError::Http { status, .. } => FailureKind::Http(*status),
        DispatchError::Cancelled => FailureKind::Cancelled,
        DispatchError::TimedOut { .. } => FailureKind::TimedOut,
        DispatchError::Transport(_) => FailureKind::Transport,
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder<T, S> {
    transport: T,
    sink: S,
    config: DispatcherConfig,
    gate: Option<GlobalGate>,
    upstream: Option<CancellationToken>,
}

impl<T, S> DispatcherBuilder<T, S> {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the telemetry sink.
    pub fn sink<S2>(self, sink: S2) -> DispatcherBuilder<T, S2> {
        DispatcherBuilder {
            transport: self.transport,
            sink,
            config: self.config,
            gate: self.gate,
            upstream: self.upstream,
        }
    }

    /// Share a global gate with other dispatchers, or drive it from tests.
    pub fn gate(mut self, gate: GlobalGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Initial upstream cancellation source.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.upstream = Some(token);
        self
    }

    pub fn build(self) -> Dispatcher<T, S> {
        Dispatcher {
            inner: Arc::new(Inner {
                transport: self.transport,
                sink: self.sink,
                config: self.config,
                gate: self.gate.unwrap_or_default(),
                buckets: RwLock::new(HashMap::new()),
                scope: Mutex::new(CancelScope::new(self.upstream.unwrap_or_default())),
                shutdown: CancellationToken::new(),
            }),
        }
    }
}
