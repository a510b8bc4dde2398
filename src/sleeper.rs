//! Abstraction for the pauses between bad-gateway retries.
//!
//! Production uses tokio timers; tests record the requested delays instead of
//! waiting so backoff behaviour can be asserted directly.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Something that can wait for a duration.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Records every requested delay and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().expect("sleeper log poisoned").clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.calls.lock().expect("sleeper log poisoned").push(duration);
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sleeper_returns_immediately() {
        let sleeper = RecordingSleeper::new();
        let start = std::time::Instant::now();
        sleeper.sleep(Duration::from_secs(30)).await;
        sleeper.sleep(Duration::from_millis(5)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(30), Duration::from_millis(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_waits_on_timer() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
