//! Observability for the dispatch engine.
//!
//! The dispatcher reports rate-limit hits, transient retries and final request
//! outcomes as [`DispatchEvent`]s. Sinks are plain `tower::Service`s, so they
//! compose with ordinary tower combinators. Delivery is best-effort: the
//! dispatcher spawns every emit and never waits on a sink.
//!
//! - **Rate limits**: [`RateLimitEvent`], pre-emptive (`retry_after: None`),
//!   reactive, or global
//! - **Retries**: [`RetryEvent::BadGateway`], [`RetryEvent::TransportTimeout`]
//! - **Outcomes**: [`RequestOutcome::Success`], [`RequestOutcome::Failure`]
//!
//! With the `telemetry-json` feature, `event_to_json` renders an event as a
//! flat JSON object.

pub mod events;
pub mod sinks;

#[cfg(feature = "telemetry-json")]
pub use events::event_to_json;
pub use events::{DispatchEvent, FailureKind, RateLimitEvent, RequestOutcome, RetryEvent};
pub use sinks::{
    emit_best_effort, ComposedSinkError, LogSink, MemorySink, MulticastSink, NullSink,
    StreamingSink, TelemetrySink,
};
