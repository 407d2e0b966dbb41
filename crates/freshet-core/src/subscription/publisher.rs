//! Single-use publisher bridging a future-valued query result to one
//! subscriber.
//!
//! The driver hands over a future that resolves to a [`RowCursor`] once
//! the first page of the query result has arrived. [`RowPublisher`]
//! waits on that future and accepts at most one subscriber; the
//! subscription is constructed exactly once, when both the cursor and a
//! subscriber are present, in whichever order they arrive.
//!
//! Upstream failure does not bypass the streaming contract: the
//! subscription is built over a cursor that re-yields the captured error
//! on every fetch attempt, so the failure reaches the subscriber through
//! the ordinary terminating-error channel once demand is requested.

use std::future::Future;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cursor::{FailedCursor, RowCursor};
use crate::error::StreamError;
use crate::executor::{default_executor, Executor};
use crate::subscription::notification::panic_message;
use crate::subscription::subscriber::RowSubscriber;
use crate::subscription::subscription::{RowSubscription, SubscriptionHandle};

// ---------------------------------------------------------------------------
// RowPublisher
// ---------------------------------------------------------------------------

enum Upstream<T: Send + 'static> {
    /// The cursor future has not resolved yet.
    Pending,
    Ready(Arc<dyn RowCursor<Row = T>>),
    Failed(StreamError),
    /// The subscription has been constructed.
    Taken,
}

enum SubscriberSlot<T: Send + 'static> {
    Empty,
    /// Attached before the upstream resolved.
    Waiting(Box<dyn RowSubscriber<T>>),
    /// Consumed into a subscription; later subscribers are rejected.
    Attached,
}

struct PublisherState<T: Send + 'static> {
    upstream: Upstream<T>,
    slot: SubscriberSlot<T>,
}

struct PublisherInner<T: Send + 'static> {
    state: Mutex<PublisherState<T>>,
    executor: Arc<dyn Executor>,
}

/// Publisher for one paginated query result.
///
/// Single-use: exactly one subscriber may attach. A second subscriber
/// receives `on_subscribe` with an inert handle followed by
/// `on_error(`[`StreamError::AlreadySubscribed`]`)`, and the first
/// subscriber's stream is unaffected.
pub struct RowPublisher<T: Send + 'static> {
    inner: Arc<PublisherInner<T>>,
}

impl<T: Send + 'static> RowPublisher<T> {
    /// Creates a publisher over a future-valued cursor, scheduling on the
    /// process-wide default executor.
    pub fn new<F>(first_page: F) -> Self
    where
        F: Future<Output = Result<Arc<dyn RowCursor<Row = T>>, StreamError>> + Send + 'static,
    {
        Self::with_executor(first_page, default_executor())
    }

    /// Creates a publisher over a future-valued cursor with an explicit
    /// executor.
    ///
    /// If the executor rejects the task that awaits the cursor, the
    /// publisher behaves as if the query failed with that scheduling
    /// error.
    pub fn with_executor<F>(first_page: F, executor: Arc<dyn Executor>) -> Self
    where
        F: Future<Output = Result<Arc<dyn RowCursor<Row = T>>, StreamError>> + Send + 'static,
    {
        let inner = Arc::new(PublisherInner {
            state: Mutex::new(PublisherState {
                upstream: Upstream::Pending,
                slot: SubscriberSlot::Empty,
            }),
            executor,
        });

        let watcher = Arc::clone(&inner);
        let task = async move {
            let result = first_page.await;
            PublisherInner::complete_upstream(&watcher, result);
        };
        if let Err(error) = inner.executor.execute(Box::pin(task)) {
            PublisherInner::complete_upstream(&inner, Err(StreamError::Scheduling(error)));
        }

        Self { inner }
    }

    /// Creates a publisher over an already-available cursor.
    pub fn from_cursor<C>(cursor: C) -> Self
    where
        C: RowCursor<Row = T>,
    {
        Self::from_cursor_with_executor(cursor, default_executor())
    }

    /// Creates a publisher over an already-available cursor with an
    /// explicit executor.
    pub fn from_cursor_with_executor<C>(cursor: C, executor: Arc<dyn Executor>) -> Self
    where
        C: RowCursor<Row = T>,
    {
        let inner = Arc::new(PublisherInner {
            state: Mutex::new(PublisherState {
                upstream: Upstream::Ready(Arc::new(cursor)),
                slot: SubscriberSlot::Empty,
            }),
            executor,
        });
        Self { inner }
    }

    /// Attaches the subscriber.
    ///
    /// The subscription activates once the upstream cursor is available
    /// (immediately, if it already is); `on_subscribe` is then invoked
    /// with a live handle. Additional subscribers are rejected with an
    /// error notification.
    pub fn subscribe<S>(&self, subscriber: S)
    where
        S: RowSubscriber<T>,
    {
        PublisherInner::subscribe(&self.inner, Box::new(subscriber));
    }
}

impl<T: Send + 'static> PublisherInner<T> {
    fn complete_upstream(
        inner: &Arc<Self>,
        result: Result<Arc<dyn RowCursor<Row = T>>, StreamError>,
    ) {
        let mut state = inner.state.lock();
        if !matches!(state.upstream, Upstream::Pending) {
            return;
        }
        state.upstream = match result {
            Ok(cursor) => Upstream::Ready(cursor),
            Err(error) => {
                tracing::debug!(%error, "query failed before first page");
                Upstream::Failed(error)
            }
        };
        Self::try_activate(inner, state);
    }

    fn subscribe(inner: &Arc<Self>, subscriber: Box<dyn RowSubscriber<T>>) {
        let mut state = inner.state.lock();
        if matches!(state.slot, SubscriberSlot::Empty) {
            state.slot = SubscriberSlot::Waiting(subscriber);
            Self::try_activate(inner, state);
            return;
        }
        drop(state);

        // Rejection handshake for the extra subscriber, on this stack:
        // it has no queue of its own.
        tracing::warn!("rejecting additional subscriber: publisher is single-use");
        let mut rejected = subscriber;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
            rejected.on_subscribe(SubscriptionHandle::detached());
        })) {
            tracing::warn!(
                "rejected subscriber panicked in on_subscribe: {}",
                panic_message(payload.as_ref())
            );
            return;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
            rejected.on_error(StreamError::AlreadySubscribed);
        })) {
            tracing::warn!(
                "rejected subscriber panicked in on_error: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    /// Constructs the subscription once both sides are present. Consumes
    /// the guard so callbacks run outside the publisher lock.
    fn try_activate(
        inner: &Arc<Self>,
        mut state: parking_lot::MutexGuard<'_, PublisherState<T>>,
    ) {
        let resolved = matches!(state.upstream, Upstream::Ready(_) | Upstream::Failed(_));
        let waiting = matches!(state.slot, SubscriberSlot::Waiting(_));
        if !resolved || !waiting {
            return;
        }

        let upstream = mem::replace(&mut state.upstream, Upstream::Taken);
        let slot = mem::replace(&mut state.slot, SubscriberSlot::Attached);
        drop(state);

        let (cursor, subscriber): (Arc<dyn RowCursor<Row = T>>, _) = match (upstream, slot) {
            (Upstream::Ready(cursor), SubscriberSlot::Waiting(subscriber)) => {
                (cursor, subscriber)
            }
            (Upstream::Failed(error), SubscriberSlot::Waiting(subscriber)) => {
                (Arc::new(FailedCursor::new(error)), subscriber)
            }
            _ => return, // guarded above
        };

        let _subscription =
            RowSubscription::activate(cursor, subscriber, Arc::clone(&inner.executor));
    }
}

// ===========================================================================
// Tests
// ===========================================================================
