#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # tollgate
//!
//! Rate-limit compliant request dispatch for chat-platform REST clients.
//!
//! The platform enforces per-route quotas and one global quota, and reports
//! both through response headers. A [`Dispatcher`] turns that metadata into
//! local waiting, so callers never exceed a quota and never see a retryable
//! 429 or 502.
//!
//! ## Features
//!
//! - **Per-route buckets** learned from `X-RateLimit-*` headers, or seeded
//!   from a static [`ClientBucket`] table
//! - **Global pause** shared by every bucket after a global 429
//! - **Deadlines and cancellation** that stay distinct: a request that gives up
//!   reports [`DispatchError::TimedOut`]; a torn-down connection reports
//!   [`DispatchError::Cancelled`]
//! - **Backoff with jitter** for 502 retries
//! - **Telemetry** as `tower::Service` sinks
//! - **Tower integration** through [`TowerTransport`] and [`DispatchLayer`]
//!
//! ## Quick Start
//!
//! ```rust
//! use http::{Method, StatusCode};
//! use std::time::Duration;
//! use tollgate::{BucketId, Dispatcher, Request, Response, TowerTransport, TransportError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = TowerTransport::new(tower::service_fn(|_req: Request| async {
//!         Ok::<_, TransportError>(Response::new(StatusCode::OK))
//!     }));
//!     let dispatcher = Dispatcher::new(transport);
//!
//!     let bucket = BucketId::with_major(
//!         Method::POST,
//!         "/channels/{channel_id}/messages",
//!         [("channel_id", "81384788765712384")],
//!     );
//!     let request = Request::new(Method::POST, "/channels/81384788765712384/messages", bucket)
//!         .with_timeout(Duration::from_secs(5));
//!
//!     match dispatcher.send(request).await {
//!         Ok(response) => println!("sent: {}", response.status),
//!         Err(err) if err.is_rate_limited() => println!("quota exhausted: {err}"),
//!         Err(err) => println!("failed: {err}"),
//!     }
//! }
//! ```

pub mod backoff;
pub mod bucket;
pub mod bucket_id;
pub mod client_bucket;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod layer;
pub mod rate_limit_info;
pub mod request;
pub mod sleeper;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use backoff::{GatewayBackoff, Jitter};
pub use bucket::BucketSnapshot;
pub use bucket_id::BucketId;
pub use client_bucket::ClientBucket;
pub use clock::{Clock, ManualClock, SystemClock, MAX_RATE_LIMIT_WAIT};
pub use config::{DispatcherConfig, DispatcherConfigBuilder};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{BuildError, DispatchError, TransportError};
pub use gate::GlobalGate;
pub use layer::{DispatchLayer, DispatchService};
pub use rate_limit_info::RateLimitInfo;
pub use request::{Request, RetryMode, Response};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
pub use telemetry::{DispatchEvent, LogSink, MemorySink, NullSink, StreamingSink, TelemetrySink};
pub use transport::{TowerTransport, Transport};
