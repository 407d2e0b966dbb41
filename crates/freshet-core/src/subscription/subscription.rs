//! Subscription state machine: demand and fetch orchestration.
//!
//! A [`RowSubscription`] binds one demand counter, one cursor, one
//! single-flight fetch coordinator, and one notification queue. The
//! subscriber drives it exclusively through a [`SubscriptionHandle`].
//!
//! # Demand processing
//!
//! `process_demand` runs whenever demand changes or a fetch completes,
//! serialized by its own lock so rows move cursor→queue as one atomic
//! step (preserving cursor order):
//!
//! 1. While rows are buffered and demand is outstanding, move one row
//!    into the queue per unit of demand.
//! 2. With demand left over: fully fetched means complete; otherwise
//!    start a fetch unless one is in flight.
//! 3. With no demand left, stop: no speculative fetch beyond demand.
//!
//! `request(n)` never runs this synchronously on the caller's stack; it
//! schedules a task, so a subscriber re-requesting from inside `on_next`
//! cannot grow the stack.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::cursor::RowCursor;
use crate::error::StreamError;
use crate::executor::Executor;
use crate::subscription::demand::DemandCounter;
use crate::subscription::fetch::FetchCoordinator;
use crate::subscription::notification::{Notification, NotificationQueue};
use crate::subscription::subscriber::RowSubscriber;

// ---------------------------------------------------------------------------
// StreamMetrics
// ---------------------------------------------------------------------------

/// Atomic counters for one subscription.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Rows handed to the subscriber via `on_next`.
    pub rows_delivered: AtomicU64,
    /// Page fetches started against the cursor.
    pub fetches_started: AtomicU64,
    /// Page fetches that resolved with an error.
    pub fetch_failures: AtomicU64,
    /// Notifications discarded because the subscription had closed.
    pub notifications_dropped: AtomicU64,
}

impl StreamMetrics {
    /// Returns rows delivered via `on_next`.
    #[must_use]
    pub fn rows_delivered(&self) -> u64 {
        self.rows_delivered.load(Ordering::Relaxed)
    }

    /// Returns page fetches started.
    #[must_use]
    pub fn fetches_started(&self) -> u64 {
        self.fetches_started.load(Ordering::Relaxed)
    }

    /// Returns page fetches that failed.
    #[must_use]
    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    /// Returns notifications dropped after close.
    #[must_use]
    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// RowSubscription
// ---------------------------------------------------------------------------

/// One subscriber's live binding to a paginated result.
pub(crate) struct RowSubscription<T: Send + 'static> {
    demand: DemandCounter,
    cursor: Arc<dyn RowCursor<Row = T>>,
    queue: Arc<NotificationQueue<T>>,
    fetch: FetchCoordinator,
    /// Serializes `process_demand` so concurrent drains cannot interleave
    /// row consumption and enqueueing.
    process_lock: Mutex<()>,
    executor: Arc<dyn Executor>,
    metrics: Arc<StreamMetrics>,
    weak_self: Weak<Self>,
}

impl<T: Send + 'static> RowSubscription<T> {
    /// Builds the subscription and delivers `on_subscribe` to the
    /// subscriber with a live handle.
    pub(crate) fn activate(
        cursor: Arc<dyn RowCursor<Row = T>>,
        subscriber: Box<dyn RowSubscriber<T>>,
        executor: Arc<dyn Executor>,
    ) -> Arc<Self> {
        let metrics = Arc::new(StreamMetrics::default());
        let queue =
            NotificationQueue::new(subscriber, Arc::clone(&executor), Arc::clone(&metrics));
        let subscription = Arc::new_cyclic(|weak| Self {
            demand: DemandCounter::new(),
            cursor,
            queue,
            fetch: FetchCoordinator::new(),
            process_lock: Mutex::new(()),
            executor,
            metrics,
            weak_self: weak.clone(),
        });
        tracing::debug!("subscription activated");
        let handle = SubscriptionHandle::live(Arc::clone(&subscription));
        subscription.queue.deliver_on_subscribe(handle);
        subscription
    }

    /// Registers demand and schedules processing.
    ///
    /// `n == 0` violates the demand protocol and terminates the
    /// subscription with [`StreamError::IllegalDemand`]; on a closed
    /// subscription every request is a no-op.
    pub(crate) fn request(&self, n: u64) {
        if !self.queue.is_open() {
            return;
        }
        if n == 0 {
            tracing::warn!("request(0) violates the demand protocol; failing the subscription");
            self.queue
                .enqueue(Notification::Error(StreamError::IllegalDemand));
            return;
        }
        self.demand.add(n);
        self.schedule_process();
    }

    /// Closes the subscription without notifying the subscriber.
    ///
    /// Idempotent; queued notifications are discarded and an in-flight
    /// fetch's completion becomes a delivery no-op.
    pub(crate) fn cancel(&self) {
        self.queue.close_silently();
    }

    /// `true` until a terminal notification is delivered or the
    /// subscription is cancelled.
    pub(crate) fn is_active(&self) -> bool {
        self.queue.is_open()
    }

    pub(crate) fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }

    fn schedule_process(&self) {
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        let task = async move { this.process_demand() };
        if let Err(error) = self.executor.execute(Box::pin(task)) {
            self.queue.report_scheduling_failure(error);
        }
    }

    /// The drain algorithm; see the module docs. Runs on executor tasks
    /// only, never on the subscriber's calling stack.
    fn process_demand(&self) {
        let _serial = self.process_lock.lock();
        if !self.queue.is_open() {
            return;
        }

        while self.cursor.available() > 0 && self.demand.try_consume() {
            match self.cursor.try_next() {
                Some(row) => self.queue.enqueue(Notification::Next(row)),
                None => {
                    // The cursor reported rows it could not produce;
                    // re-credit the consumed unit and fall through to the
                    // fetch decision.
                    self.demand.add(1);
                    break;
                }
            }
        }

        if self.demand.outstanding() == 0 {
            return;
        }
        if self.cursor.is_fully_fetched() {
            self.queue.enqueue(Notification::Complete);
            return;
        }
        self.start_fetch();
    }

    /// Starts a page fetch unless one is already in flight. The
    /// completion task clears the in-flight flag first, then either
    /// resumes demand processing or terminates with the fetch error.
    fn start_fetch(&self) {
        if !self.fetch.try_begin() {
            return;
        }
        let Some(this) = self.weak_self.upgrade() else {
            self.fetch.finish();
            return;
        };

        self.metrics.fetches_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("fetching next page");
        let future = self.cursor.fetch_more();
        let task = async move {
            let result = future.await;
            this.fetch.finish();
            match result {
                Ok(()) => this.process_demand(),
                Err(error) => {
                    this.metrics.fetch_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%error, "page fetch failed; terminating subscription");
                    this.queue.enqueue(Notification::Error(error));
                }
            }
        };
        if let Err(error) = self.executor.execute(Box::pin(task)) {
            self.fetch.finish();
            self.queue.report_scheduling_failure(error);
        }
    }
}

// ---------------------------------------------------------------------------
// SubscriptionHandle
// ---------------------------------------------------------------------------

enum HandleRef<T: Send + 'static> {
    Live(Arc<RowSubscription<T>>),
    /// Inert handle given to rejected subscribers; every operation is a
    /// no-op.
    Detached,
}

/// The subscriber-facing half of a subscription.
///
/// Handed to the subscriber in `on_subscribe`; cloneable so it can be
/// shared with whatever drives demand. All methods are safe to call from
/// any thread and from within subscriber callbacks.
pub struct SubscriptionHandle<T: Send + 'static> {
    inner: HandleRef<T>,
}

impl<T: Send + 'static> SubscriptionHandle<T> {
    pub(crate) fn live(subscription: Arc<RowSubscription<T>>) -> Self {
        Self {
            inner: HandleRef::Live(subscription),
        }
    }

    pub(crate) fn detached() -> Self {
        Self {
            inner: HandleRef::Detached,
        }
    }

    /// Requests `n` more rows.
    ///
    /// `n == 0` is a protocol violation that terminates the subscription
    /// with an error notification. Demand saturates at `u64::MAX`
    /// (effectively unbounded).
    pub fn request(&self, n: u64) {
        if let HandleRef::Live(subscription) = &self.inner {
            subscription.request(n);
        }
    }

    /// Cancels the subscription: immediate, idempotent, and silent (no
    /// terminal notification is delivered).
    pub fn cancel(&self) {
        if let HandleRef::Live(subscription) = &self.inner {
            subscription.cancel();
        }
    }

    /// `true` while the subscription can still deliver notifications.
    #[must_use]
    pub fn is_active(&self) -> bool {
        match &self.inner {
            HandleRef::Live(subscription) => subscription.is_active(),
            HandleRef::Detached => false,
        }
    }

    /// Returns this subscription's counters, or `None` for the inert
    /// handle given to rejected subscribers.
    #[must_use]
    pub fn metrics(&self) -> Option<Arc<StreamMetrics>> {
        match &self.inner {
            HandleRef::Live(subscription) => Some(Arc::clone(subscription.metrics())),
            HandleRef::Detached => None,
        }
    }
}

impl<T: Send + 'static> Clone for SubscriptionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: match &self.inner {
                HandleRef::Live(subscription) => HandleRef::Live(Arc::clone(subscription)),
                HandleRef::Detached => HandleRef::Detached,
            },
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
