use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fetchq::errors::TransportError;
use fetchq::request::{Method, RequestSpec};
use fetchq::transport::{BoxFuture, Response, Transport};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One canned transport result.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(Response),
    Fail(TransportError),
}

/// A request the fake transport received.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: std::collections::BTreeMap<String, String>,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<CallRecord>>,
    delay: Mutex<Option<Duration>>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    finished: AtomicUsize,
}

impl Inner {
    fn next_outcome(&self, url: &str) -> Result<Response, TransportError> {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            None => Ok(Response::new(200).with_body(url.as_bytes().to_vec())),
        }
    }
}

/// Decrements `in_flight` however the call ends, including being dropped.
struct InFlight<'a>(&'a Inner);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A scripted transport that:
/// - records every call it receives
/// - replays queued results per URL, falling back to `200` with the URL as body
/// - optionally holds every call until the test releases it
/// - honours the cancellation token
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Inner>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call blocks until [`release`](Self::release) hands it a permit.
    pub fn held() -> Self {
        Self {
            inner: Arc::new(Inner {
                gate: Some(Semaphore::new(0)),
                ..Inner::default()
            }),
        }
    }

    /// Let `n` held calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.inner.gate {
            gate.add_permits(n);
        }
    }

    /// Every call sleeps `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn push(&self, url: &str, scripted: Scripted) {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.push(url, Scripted::Respond(response));
    }

    pub fn respond_status(&self, url: &str, status: u16, times: usize) {
        for _ in 0..times {
            self.respond(url, Response::new(status));
        }
    }

    pub fn fail(&self, url: &str, error: TransportError, times: usize) {
        for _ in 0..times {
            self.push(url, Scripted::Fail(error.clone()));
        }
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.inner
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.url == url)
            .count()
    }

    /// URLs in the order calls arrived.
    pub fn call_urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls that produced a result (not cancelled or dropped).
    pub fn finished(&self) -> usize {
        self.inner.finished.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    fn send(
        &self,
        request: RequestSpec,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<Response, TransportError>> {
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            inner.calls.lock().unwrap().push(CallRecord {
                method: request.method,
                url: request.url.clone(),
                query: request.query.clone(),
                headers: request.headers.clone(),
                at: Instant::now(),
            });

            let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _in_flight = InFlight(&inner);

            let call = async {
                if let Some(gate) = &inner.gate {
                    gate.acquire().await.unwrap().forget();
                }
                let delay = *inner.delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let outcome = inner.next_outcome(&request.url);
                inner.finished.fetch_add(1, Ordering::SeqCst);
                outcome
            };

            tokio::select! {
                _ = cancel.cancelled() => Err(TransportError::Canceled),
                outcome = call => outcome,
            }
        })
    }
}
