//! Cross-bucket pause triggered by a global-scope 429.
//!
//! The gate is a single atomic deadline shared by cloning. Reading it is one
//! atomic load; nothing else is held while a caller decides to wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::clock::{instant_after, MAX_RATE_LIMIT_WAIT};

/// Shared global-pause deadline.
///
/// ```rust
/// use std::time::Duration;
/// use tollgate::GlobalGate;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = GlobalGate::new();
/// assert!(!gate.is_paused());
/// gate.pause(Duration::from_secs(2));
/// assert!(gate.is_paused());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GlobalGate {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    origin: Instant,
    // Nanoseconds after `origin`; 0 means open.
    until: AtomicU64,
}

impl GlobalGate {
    pub fn new() -> Self {
        Self { inner: Arc::new(Inner { origin: Instant::now(), until: AtomicU64::new(0) }) }
    }

    /// Close the gate for `duration` from now, capped at [`MAX_RATE_LIMIT_WAIT`].
    /// An existing later deadline is kept.
    pub fn pause(&self, duration: Duration) {
        let duration = duration.min(MAX_RATE_LIMIT_WAIT);
        let until = self.offset(instant_after(Instant::now(), duration));
        let previous = self.inner.until.fetch_max(until, Ordering::AcqRel);
        if until > previous {
            let pause_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            warn!(target: "tollgate::gate", pause_ms, "global rate limit engaged");
        }
    }

    /// Deadline of the current pause, if one is still running.
    pub fn paused_until(&self) -> Option<Instant> {
        match self.inner.until.load(Ordering::Acquire) {
            0 => None,
            nanos => {
                let until = self.inner.origin + Duration::from_nanos(nanos);
                (until > Instant::now()).then_some(until)
            }
        }
    }

    /// Time left on the current pause.
    pub fn remaining(&self) -> Option<Duration> {
        self.paused_until().map(|until| until.saturating_duration_since(Instant::now()))
    }

    pub fn is_paused(&self) -> bool {
        self.paused_until().is_some()
    }

    /// Reopen immediately.
    pub fn clear(&self) {
        self.inner.until.store(0, Ordering::Release);
    }

    fn offset(&self, at: Instant) -> u64 {
        let nanos = at.saturating_duration_since(self.inner.origin).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX).max(1)
    }
}

impl Default for GlobalGate {
    fn default() -> Self {
        Self::new()
    }
}
