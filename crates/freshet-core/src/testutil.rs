//! Shared test doubles: a deterministically pumped executor, a rejecting
//! executor, a recording subscriber, and a scripted cursor with gated or
//! failing pages.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::task::noop_waker;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::cursor::RowCursor;
use crate::error::StreamError;
use crate::executor::{Executor, SchedulingError};
use crate::subscription::{RowSubscriber, SubscriptionHandle};

// ---------------------------------------------------------------------------
// ManualExecutor
// ---------------------------------------------------------------------------

/// Executor whose tasks only run when the test pumps them, making every
/// interleaving explicit and deterministic.
pub(crate) struct ManualExecutor {
    tasks: Mutex<VecDeque<BoxFuture<'static, ()>>>,
}

impl ManualExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(VecDeque::new()),
        })
    }

    /// Polls queued tasks (and any they spawn) until none can make
    /// further progress. Tasks parked on a gate stay queued and are
    /// re-polled by the next `run` call.
    pub(crate) fn run(&self) -> usize {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut completed = 0;
        loop {
            let batch: Vec<BoxFuture<'static, ()>> = self.tasks.lock().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            let mut progressed = false;
            for mut task in batch {
                match task.as_mut().poll(&mut cx) {
                    Poll::Ready(()) => {
                        completed += 1;
                        progressed = true;
                    }
                    Poll::Pending => self.tasks.lock().push_back(task),
                }
            }
            if !progressed {
                break;
            }
        }
        completed
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, task: BoxFuture<'static, ()>) -> Result<(), SchedulingError> {
        self.tasks.lock().push_back(task);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingExecutor
// ---------------------------------------------------------------------------

/// Executor that rejects every task, for scheduling-failure paths.
pub(crate) struct FailingExecutor;

impl Executor for FailingExecutor {
    fn execute(&self, _task: BoxFuture<'static, ()>) -> Result<(), SchedulingError> {
        Err(SchedulingError::new("test executor rejects all tasks"))
    }
}

// ---------------------------------------------------------------------------
// RecordingSubscriber
// ---------------------------------------------------------------------------

/// One observed subscriber callback.
#[derive(Clone)]
pub(crate) enum SubscriberEvent<T> {
    Subscribed,
    Next(T),
    Error(StreamError),
    Complete,
}

/// Shared log of everything a [`RecordingSubscriber`] observed.
pub(crate) struct Recording<T> {
    events: Mutex<Vec<SubscriberEvent<T>>>,
}

impl<T: Clone> Recording<T> {
    pub(crate) fn events(&self) -> Vec<SubscriberEvent<T>> {
        self.events.lock().clone()
    }

    pub(crate) fn rows(&self) -> Vec<T> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SubscriberEvent::Next(row) => Some(row.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn subscribe_count(&self) -> usize {
        self.count(|e| matches!(e, SubscriberEvent::Subscribed))
    }

    pub(crate) fn error_count(&self) -> usize {
        self.count(|e| matches!(e, SubscriberEvent::Error(_)))
    }

    pub(crate) fn complete_count(&self) -> usize {
        self.count(|e| matches!(e, SubscriberEvent::Complete))
    }

    pub(crate) fn terminal_count(&self) -> usize {
        self.error_count() + self.complete_count()
    }

    pub(crate) fn last_error(&self) -> Option<StreamError> {
        self.events.lock().iter().rev().find_map(|e| match e {
            SubscriberEvent::Error(error) => Some(error.clone()),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&SubscriberEvent<T>) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

/// Subscriber that records every callback, with optional initial demand
/// and an optional callback to panic in.
pub(crate) struct RecordingSubscriber<T: Send + 'static> {
    log: Arc<Recording<T>>,
    request_on_subscribe: u64,
    panic_in: Option<&'static str>,
}

impl<T: Send + 'static> RecordingSubscriber<T> {
    pub(crate) fn new() -> (Self, Arc<Recording<T>>) {
        let log = Arc::new(Recording {
            events: Mutex::new(Vec::new()),
        });
        (
            Self {
                log: Arc::clone(&log),
                request_on_subscribe: 0,
                panic_in: None,
            },
            log,
        )
    }

    /// Demand requested from inside `on_subscribe`; 0 requests nothing.
    pub(crate) fn request_on_subscribe(mut self, n: u64) -> Self {
        self.request_on_subscribe = n;
        self
    }

    /// Panic inside the named callback.
    pub(crate) fn panic_in(mut self, callback: &'static str) -> Self {
        self.panic_in = Some(callback);
        self
    }
}

impl<T: Send + 'static> RowSubscriber<T> for RecordingSubscriber<T> {
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>) {
        self.log.events.lock().push(SubscriberEvent::Subscribed);
        if self.panic_in == Some("on_subscribe") {
            panic!("test panic in on_subscribe");
        }
        if self.request_on_subscribe > 0 {
            subscription.request(self.request_on_subscribe);
        }
    }

    fn on_next(&mut self, row: T) {
        self.log.events.lock().push(SubscriberEvent::Next(row));
        if self.panic_in == Some("on_next") {
            panic!("test panic in on_next");
        }
    }

    fn on_error(&mut self, error: StreamError) {
        self.log.events.lock().push(SubscriberEvent::Error(error));
        if self.panic_in == Some("on_error") {
            panic!("test panic in on_error");
        }
    }

    fn on_complete(&mut self) {
        self.log.events.lock().push(SubscriberEvent::Complete);
        if self.panic_in == Some("on_complete") {
            panic!("test panic in on_complete");
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedCursor
// ---------------------------------------------------------------------------

/// One scripted `fetch_more` outcome.
pub(crate) struct PageScript {
    gate: Option<oneshot::Receiver<()>>,
    outcome: Result<Vec<i64>, String>,
}

/// Releases a gated [`PageScript`], letting its fetch complete.
pub(crate) struct GateRelease {
    tx: oneshot::Sender<()>,
}

impl GateRelease {
    pub(crate) fn release(self) {
        let _ = self.tx.send(());
    }
}

impl PageScript {
    /// Fetch resolves immediately with these rows.
    pub(crate) fn rows(rows: Vec<i64>) -> Self {
        Self {
            gate: None,
            outcome: Ok(rows),
        }
    }

    /// Fetch resolves immediately with a failure.
    pub(crate) fn fail(message: &str) -> Self {
        Self {
            gate: None,
            outcome: Err(message.to_string()),
        }
    }

    /// Fetch parks until the returned gate is released, then yields rows.
    pub(crate) fn gated_rows(rows: Vec<i64>) -> (Self, GateRelease) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                gate: Some(rx),
                outcome: Ok(rows),
            },
            GateRelease { tx },
        )
    }

    /// Fetch parks until the returned gate is released, then fails.
    pub(crate) fn gated_fail(message: &str) -> (Self, GateRelease) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                gate: Some(rx),
                outcome: Err(message.to_string()),
            },
            GateRelease { tx },
        )
    }
}

struct ScriptedState {
    buffered: VecDeque<i64>,
    scripts: VecDeque<PageScript>,
    /// Pages not yet successfully fetched; fully-fetched means zero.
    unfinished: usize,
    fetch_calls: u64,
    in_flight: u32,
    max_in_flight: u32,
}

/// Cursor whose pages arrive exactly as scripted: immediately, after a
/// gate, or as a failure. Counts fetch calls and concurrent fetches.
pub(crate) struct ScriptedCursor {
    inner: Arc<Mutex<ScriptedState>>,
}

impl ScriptedCursor {
    pub(crate) fn new(first_page: Vec<i64>, scripts: Vec<PageScript>) -> Self {
        let unfinished = scripts.len();
        Self {
            inner: Arc::new(Mutex::new(ScriptedState {
                buffered: first_page.into(),
                scripts: scripts.into_iter().collect(),
                unfinished,
                fetch_calls: 0,
                in_flight: 0,
                max_in_flight: 0,
            })),
        }
    }

    pub(crate) fn fetch_calls(&self) -> u64 {
        self.inner.lock().fetch_calls
    }

    pub(crate) fn max_in_flight(&self) -> u32 {
        self.inner.lock().max_in_flight
    }
}

impl Clone for ScriptedCursor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl RowCursor for ScriptedCursor {
    type Row = i64;

    fn available(&self) -> usize {
        self.inner.lock().buffered.len()
    }

    fn is_fully_fetched(&self) -> bool {
        self.inner.lock().unfinished == 0
    }

    fn try_next(&self) -> Option<i64> {
        self.inner.lock().buffered.pop_front()
    }

    fn fetch_more(&self) -> BoxFuture<'static, Result<(), StreamError>> {
        let inner = Arc::clone(&self.inner);
        {
            let mut state = self.inner.lock();
            state.fetch_calls += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        Box::pin(async move {
            let script = inner.lock().scripts.pop_front();
            let Some(script) = script else {
                inner.lock().in_flight -= 1;
                return Ok(());
            };
            if let Some(gate) = script.gate {
                let _ = gate.await;
            }
            let mut state = inner.lock();
            state.in_flight -= 1;
            match script.outcome {
                Ok(rows) => {
                    state.unfinished -= 1;
                    state.buffered.extend(rows);
                    Ok(())
                }
                Err(message) => Err(StreamError::fetch(std::io::Error::other(message))),
            }
        })
    }
}
