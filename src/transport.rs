//! The I/O seam: whatever actually issues the HTTP call.
//!
//! The dispatcher only needs a status, headers and a body back. Connection
//! reuse, TLS and serialisation all live behind this trait.

use crate::error::TransportError;
use crate::request::{Request, Response};
use async_trait::async_trait;
use std::sync::Arc;
use tower::ServiceExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Issues one request and returns the raw response.
///
/// A non-success status is still `Ok`; the dispatcher classifies it.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request).await
    }
}

/// Adapts any `tower::Service<Request>` into a [`Transport`].
///
/// Errors that are already a [`TransportError`] pass through unchanged; any
/// other error becomes [`TransportError::Other`].
///
/// ```rust
/// use http::StatusCode;
/// use tollgate::{Request, Response, TowerTransport, TransportError};
///
/// let transport = TowerTransport::new(tower::service_fn(|_req: Request| async {
///     Ok::<_, TransportError>(Response::new(StatusCode::OK))
/// }));
/// # let _ = transport;
/// ```
#[derive(Debug, Clone)]
pub struct TowerTransport<S> {
    inner: S,
}

impl<S> TowerTransport<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S> Transport for TowerTransport<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
{
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        self.inner.clone().oneshot(request.clone()).await.map_err(|err| {
            let err: BoxError = err.into();
            match err.downcast::<TransportError>() {
                Ok(transport) => *transport,
                Err(other) => TransportError::Other(Arc::from(other)),
            }
        })
    }
}
