#![allow(dead_code)]

use async_trait::async_trait;
use http::{Method, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tollgate::{BucketId, Request, Response, Transport, TransportError};

/// One scripted transport reaction.
pub enum Step {
    Reply(Response),
    Fail(TransportError),
    /// Hold the call for a while, then reply.
    Delay(Duration, Response),
}

/// In-memory transport answering from per-path scripts.
///
/// Paths without a script (or with an exhausted one) get a generous 200.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    total: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, path: &str, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().insert(path.to_owned(), steps.into());
        self
    }

    pub fn push(&self, path: &str, step: Step) {
        self.scripts.lock().unwrap().entry(path.to_owned()).or_default().push_back(step);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Invocation times for `path`, in order.
    pub fn calls_to(&self, path: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push((request.path().to_owned(), Instant::now()));
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(request.path())
            .and_then(|steps| steps.pop_front());
        match step {
            Some(Step::Reply(resp)) => Ok(resp),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Delay(delay, resp)) => {
                tokio::time::sleep(delay).await;
                Ok(resp)
            }
            None => Ok(ok(100, 99, "1")),
        }
    }
}

pub fn get(path: &str) -> Request {
    Request::new(Method::GET, path, BucketId::new(Method::GET, path))
}

/// 200 with a full set of bucket headers.
pub fn ok(limit: u32, remaining: u32, reset_after: &str) -> Response {
    Response::new(StatusCode::OK)
        .with_header("X-RateLimit-Limit", &limit.to_string())
        .with_header("X-RateLimit-Remaining", &remaining.to_string())
        .with_header("X-RateLimit-Reset-After", reset_after)
}

pub fn status(code: u16) -> Response {
    Response::new(StatusCode::from_u16(code).unwrap())
}

/// Let spawned tasks (refills, telemetry) run without moving the paused clock far.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
