//! Tower middleware that puts a [`Dispatcher`] in front of a transport service.
//!
//! ```rust
//! use http::{Method, StatusCode};
//! use tollgate::{BucketId, DispatchLayer, Request, Response, TransportError};
//! use tower::{Layer, ServiceExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let http = tower::service_fn(|_req: Request| async {
//!     Ok::<_, TransportError>(Response::new(StatusCode::OK))
//! });
//! let svc = DispatchLayer::new().layer(http);
//!
//! let req = Request::new(Method::GET, "/gateway", BucketId::new(Method::GET, "/gateway"));
//! let resp = svc.oneshot(req).await.unwrap();
//! assert_eq!(resp.status, StatusCode::OK);
//! # }
//! ```

use crate::config::DispatcherConfig;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::gate::GlobalGate;
use crate::request::{Request, Response};
use crate::telemetry::{NullSink, TelemetrySink};
use crate::transport::{TowerTransport, Transport};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Wraps a transport service so every request goes through a dispatcher.
#[derive(Clone, Debug)]
pub struct DispatchLayer<S = NullSink> {
    config: DispatcherConfig,
    sink: S,
    gate: Option<GlobalGate>,
}

impl DispatchLayer<NullSink> {
    pub fn new() -> Self {
        Self { config: DispatcherConfig::default(), sink: NullSink, gate: None }
    }
}

impl Default for DispatchLayer<NullSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> DispatchLayer<S> {
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink<S2>(self, sink: S2) -> DispatchLayer<S2> {
        DispatchLayer { config: self.config, sink, gate: self.gate }
    }

    /// Share one global gate across every service this layer builds.
    pub fn with_gate(mut self, gate: GlobalGate) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl<Svc, S> Layer<Svc> for DispatchLayer<S>
where
    TowerTransport<Svc>: Transport,
    S: Clone,
{
    type Service = DispatchService<TowerTransport<Svc>, S>;

    fn layer(&self, inner: Svc) -> Self::Service {
        let mut builder = Dispatcher::builder(TowerTransport::new(inner))
            .config(self.config.clone())
            .sink(self.sink.clone());
        if let Some(gate) = &self.gate {
            builder = builder.gate(gate.clone());
        }
        DispatchService { dispatcher: builder.build() }
    }
}

/// Service produced by [`DispatchLayer`].
#[derive(Debug)]
pub struct DispatchService<T, S = NullSink> {
    dispatcher: Dispatcher<T, S>,
}

impl<T, S> Clone for DispatchService<T, S> {
    fn clone(&self) -> Self {
        Self { dispatcher: self.dispatcher.clone() }
    }
}

impl<T, S> DispatchService<T, S> {
    pub fn new(dispatcher: Dispatcher<T, S>) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher behind this service, for `reset` and inspection.
    pub fn dispatcher(&self) -> &Dispatcher<T, S> {
        &self.dispatcher
    }
}

impl<T, S> Service<Request> for DispatchService<T, S>
where
    T: Transport,
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        Box::pin(async move { dispatcher.send(req).await })
    }
}
