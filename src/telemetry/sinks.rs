use super::events::DispatchEvent;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower::Service;

type SinkFuture<E> = Pin<Box<dyn std::future::Future<Output = Result<(), E>> + Send>>;

/// A consumer of [`DispatchEvent`]s, expressed as a `tower::Service`.
///
/// ```rust
/// use tollgate::telemetry::{DispatchEvent, TelemetrySink};
/// use tower::Service;
/// use std::task::{Context, Poll};
/// use std::pin::Pin;
/// use std::future::Future;
///
/// #[derive(Clone)]
/// struct Counter;
///
/// impl Service<DispatchEvent> for Counter {
///     type Response = ();
///     type Error = std::convert::Infallible;
///     type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;
///
///     fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
///         Poll::Ready(Ok(()))
///     }
///
///     fn call(&mut self, event: DispatchEvent) -> Self::Future {
///         println!("{event}");
///         Box::pin(async { Ok(()) })
///     }
/// }
///
/// impl TelemetrySink for Counter {
///     type SinkError = std::convert::Infallible;
/// }
/// ```
pub trait TelemetrySink:
    tower::Service<DispatchEvent, Response = (), Error = Self::SinkError> + Clone + Send + Sync + 'static
{
    type SinkError: std::error::Error + Send + 'static;
}

/// Deliver `event` if the sink becomes ready; drop it on any error.
pub async fn emit_best_effort<S>(sink: S, event: DispatchEvent)
where
    S: tower::Service<DispatchEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    match sink.ready_oneshot().await {
        Ok(mut ready) => {
            if let Err(err) = ready.call(event).await {
                tracing::debug!(target: "tollgate::telemetry", error = %err, "telemetry sink rejected event");
            }
        }
        Err(err) => {
            tracing::debug!(target: "tollgate::telemetry", error = %err, "telemetry sink not ready");
        }
    }
}

/// Discards every event.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<DispatchEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: DispatchEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// Logs every event at INFO through `tracing`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<DispatchEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DispatchEvent) -> Self::Future {
        tracing::info!(target: "tollgate::telemetry", event = %event, "dispatch_event");
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// Keeps events in memory, evicting the oldest past `capacity`.
///
/// ```rust
/// use tollgate::telemetry::{DispatchEvent, MemorySink, RequestOutcome};
/// use tollgate::BucketId;
/// use tower::Service;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut sink = MemorySink::new();
/// let event = DispatchEvent::Request(RequestOutcome::Success {
///     bucket: BucketId::from("GET /gateway"),
///     attempts: 1,
///     duration: Duration::from_millis(20),
/// });
/// sink.call(event.clone()).await.unwrap();
/// assert_eq!(sink.events(), vec![event]);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<DispatchEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Bounded at 10,000 events.
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DispatchEvent>> {
        self.events.lock().expect("memory sink poisoned")
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<DispatchEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DispatchEvent) -> Self::Future {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

/// Broadcasts events to any number of subscribers.
///
/// Slow subscribers miss events once the channel buffer wraps.
#[derive(Clone, Debug)]
pub struct StreamingSink {
    sender: Arc<tokio::sync::broadcast::Sender<DispatchEvent>>,
    dropped: Arc<AtomicU64>,
    last_drop_ns: Arc<AtomicU64>,
}

impl StreamingSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
            dropped: Arc::new(AtomicU64::new(0)),
            last_drop_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Events sent while nobody was subscribed.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn last_drop(&self) -> Option<SystemTime> {
        match self.last_drop_ns.load(Ordering::Relaxed) {
            0 => None,
            ns => UNIX_EPOCH.checked_add(Duration::from_nanos(ns)),
        }
    }
}

impl Service<DispatchEvent> for StreamingSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DispatchEvent) -> Self::Future {
        if self.sender.send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
            self.last_drop_ns.store(u64::try_from(now).unwrap_or(u64::MAX), Ordering::Relaxed);
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for StreamingSink {
    type SinkError = Infallible;
}

/// Error from one side of a [`MulticastSink`].
#[derive(Debug)]
pub struct ComposedSinkError(Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Display for ComposedSinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "telemetry sink failed: {}", self.0)
    }
}

impl std::error::Error for ComposedSinkError {}

/// Sends every event to both sinks.
#[derive(Clone, Debug)]
pub struct MulticastSink<A, B> {
    sink_a: A,
    sink_b: B,
}

impl<A, B> MulticastSink<A, B> {
    pub fn new(sink_a: A, sink_b: B) -> Self {
        Self { sink_a, sink_b }
    }
}

impl<A, B> Service<DispatchEvent> for MulticastSink<A, B>
where
    A: tower::Service<DispatchEvent, Response = ()> + Clone + Send + 'static,
    A::Error: std::error::Error + Send + Sync + 'static,
    A::Future: Send + 'static,
    B: tower::Service<DispatchEvent, Response = ()> + Clone + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
    B::Future: Send + 'static,
{
    type Response = ();
    type Error = ComposedSinkError;
    type Future = SinkFuture<ComposedSinkError>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DispatchEvent) -> Self::Future {
        let mut sink_a = self.sink_a.clone();
        let mut sink_b = self.sink_b.clone();
        let copy = event.clone();

        Box::pin(async move {
            let (res_a, res_b) = tokio::join!(sink_a.call(event), sink_b.call(copy));
            res_a.map_err(|e| ComposedSinkError(Box::new(e)))?;
            res_b.map_err(|e| ComposedSinkError(Box::new(e)))?;
            Ok(())
        })
    }
}

impl<A, B> TelemetrySink for MulticastSink<A, B>
where
    A: tower::Service<DispatchEvent, Response = ()> + Clone + Send + Sync + 'static,
    A::Error: std::error::Error + Send + Sync + 'static,
    A::Future: Send + 'static,
    B: tower::Service<DispatchEvent, Response = ()> + Clone + Send + Sync + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
    B::Future: Send + 'static,
{
    type SinkError = ComposedSinkError;
}
