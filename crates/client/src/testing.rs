//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use seiche_core::Error;

use crate::transport::{EventStream, HttpRequest, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted transport that records every request.
///
/// Single-shot responses are consumed from a queue; each `stream()` call
/// opens a fresh channel whose sender the test drives via
/// [`MockTransport::push_change`]. Stream handles count themselves so tests
/// can assert that at most one connection is ever delivering.
pub(crate) struct MockTransport {
    fetches: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<Result<Value, Error>>>,
    stream_requests: Mutex<Vec<HttpRequest>>,
    feed_tx: Mutex<Option<mpsc::UnboundedSender<Result<Value, Error>>>>,
    streams_opened: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            fetches: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            stream_requests: Mutex::new(Vec::new()),
            feed_tx: Mutex::new(None),
            streams_opened: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push_response(&self, response: Result<Value, Error>) {
        lock(&self.responses).push_back(response);
    }

    pub(crate) fn push_change(&self, value: Value) {
        self.feed_sender().send(Ok(value)).expect("feed receiver dropped");
    }

    pub(crate) fn feed_sender(&self) -> mpsc::UnboundedSender<Result<Value, Error>> {
        lock(&self.feed_tx).clone().expect("no feed connection open")
    }

    pub(crate) fn fetches(&self) -> Vec<HttpRequest> {
        lock(&self.fetches).clone()
    }

    pub(crate) fn stream_requests(&self) -> Vec<HttpRequest> {
        lock(&self.stream_requests).clone()
    }

    pub(crate) fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    pub(crate) fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active_streams(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &HttpRequest) -> Result<Value, Error> {
        lock(&self.fetches).push(request.clone());
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(Error::Network("no scripted response".to_string())))
    }

    async fn stream(&self, request: &HttpRequest) -> Result<EventStream, Error> {
        lock(&self.stream_requests).push(request.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.feed_tx) = Some(tx);

        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let guard = ActiveGuard { active: self.active.clone() };

        Ok(Box::pin(futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        })))
    }
}

/// Let spawned controller tasks run on the current-thread test runtime.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
