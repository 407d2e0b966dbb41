//! Per-subscription notification queue and delivery loop.
//!
//! All subscriber callbacks for one subscription funnel through a
//! [`NotificationQueue`]: notifications are delivered strictly in enqueue
//! order, one at a time, and never after a terminating one. Each drain
//! step runs as its own executor task and delivers exactly one
//! notification; the `draining` flag (held under the queue lock) keeps at
//! most one step live, while the callback itself runs outside the lock.
//!
//! # Terminal discipline
//!
//! A terminating notification closes the queue *before* its callback is
//! invoked, so demand issued from inside `on_error` / `on_complete` is
//! never processed, and notifications enqueued concurrently with closure
//! are dropped (counted, debug-logged).
//!
//! # Panic policy
//!
//! A panic from `on_error` is swallowed and logged: the subscription is
//! already terminating and a cascading failure helps nobody. A panic from
//! `on_next` fails the subscription: whatever was queued is replaced by a
//! terminating error. A panic from `on_complete` is caught and logged;
//! the queue closed before the callback ran, so nothing follows either way.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::StreamError;
use crate::executor::{Executor, SchedulingError};
use crate::subscription::subscriber::RowSubscriber;
use crate::subscription::subscription::{StreamMetrics, SubscriptionHandle};

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A queued subscriber signal.
pub(crate) enum Notification<T> {
    /// Deliver one row via `on_next`.
    Next(T),
    /// Terminate via `on_error`.
    Error(StreamError),
    /// Terminate via `on_complete`.
    Complete,
}

impl<T> Notification<T> {
    /// `true` for the two terminal signals.
    pub(crate) fn is_terminating(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Complete)
    }

    /// Short name for logs.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Next(_) => "next",
            Self::Error(_) => "error",
            Self::Complete => "complete",
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationQueue
// ---------------------------------------------------------------------------

struct QueueState<T: Send + 'static> {
    pending: VecDeque<Notification<T>>,
    /// Absent while a delivery holds the subscriber, and permanently after
    /// close.
    subscriber: Option<Box<dyn RowSubscriber<T>>>,
    /// At most one drain step live at a time.
    draining: bool,
    /// Terminal flag; absorbing.
    closed: bool,
    /// A scheduling failure that arrived while a delivery held the
    /// subscriber; delivered when that delivery returns it.
    scheduling_failure: Option<SchedulingError>,
}

/// Ordered, single-consumer delivery loop for one subscriber.
pub(crate) struct NotificationQueue<T: Send + 'static> {
    state: Mutex<QueueState<T>>,
    executor: Arc<dyn Executor>,
    metrics: Arc<StreamMetrics>,
    weak_self: Weak<Self>,
}

impl<T: Send + 'static> NotificationQueue<T> {
    /// Creates a queue owning the subscriber.
    pub(crate) fn new(
        subscriber: Box<dyn RowSubscriber<T>>,
        executor: Arc<dyn Executor>,
        metrics: Arc<StreamMetrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                subscriber: Some(subscriber),
                draining: false,
                closed: false,
                scheduling_failure: None,
            }),
            executor,
            metrics,
            weak_self: weak.clone(),
        })
    }

    /// `true` until a terminating notification is delivered or the queue
    /// is closed by cancellation.
    pub(crate) fn is_open(&self) -> bool {
        !self.state.lock().closed
    }

    /// Appends a notification; schedules a drain step if none is running.
    ///
    /// On a closed queue this is a counted no-op.
    pub(crate) fn enqueue(&self, notification: Notification<T>) {
        let should_schedule = {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                self.metrics.notifications_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kind = notification.kind(), "dropping notification after close");
                return;
            }
            state.pending.push_back(notification);
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };
        if should_schedule {
            self.schedule_drain();
        }
    }

    /// Closes the queue without notifying the subscriber.
    ///
    /// Queued notifications are discarded and later enqueues become
    /// no-ops. Idempotent. This is cancellation: subscriber-initiated
    /// withdrawal, not a signal delivered to the subscriber.
    pub(crate) fn close_silently(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.pending.clear();
        // If a delivery is in progress the subscriber is owned by that
        // drain step and is dropped when it completes.
        state.subscriber = None;
    }

    /// Delivers `on_subscribe` under the same exclusivity discipline as a
    /// drain step. A panic here cancels the subscription.
    pub(crate) fn deliver_on_subscribe(&self, handle: SubscriptionHandle<T>) {
        let subscriber = {
            let mut state = self.state.lock();
            if state.closed || state.draining {
                return;
            }
            state.draining = true;
            state.subscriber.take()
        };
        let Some(mut subscriber) = subscriber else {
            self.state.lock().draining = false;
            return;
        };

        let panicked = catch_unwind(AssertUnwindSafe(|| subscriber.on_subscribe(handle))).is_err();
        if panicked {
            tracing::warn!("subscriber panicked in on_subscribe; cancelling subscription");
        }
        self.finish_delivery(subscriber, None);
        if panicked {
            self.close_silently();
        }
    }

    /// Reports that the execution substrate rejected a streaming task.
    ///
    /// Closes the queue and delivers the failure to the subscriber
    /// synchronously on the caller's stack. This is the sole bypass of
    /// queue ordering, since the queue's own delivery mechanism is what
    /// failed.
    pub(crate) fn report_scheduling_failure(&self, error: SchedulingError) {
        tracing::warn!(%error, "executor rejected streaming task; closing subscription");
        let subscriber = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.clear();
            let taken = state.subscriber.take();
            if taken.is_none() && state.draining {
                // A delivery holds the subscriber; it will hand the error
                // over when it returns.
                state.scheduling_failure = Some(error.clone());
            }
            taken
        };
        if let Some(mut subscriber) = subscriber {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
                subscriber.on_error(StreamError::Scheduling(error));
            })) {
                tracing::warn!(
                    "subscriber panicked in on_error: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    fn schedule_drain(&self) {
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        let task = async move { this.drain_one() };
        if let Err(error) = self.executor.execute(Box::pin(task)) {
            self.report_scheduling_failure(error);
        }
    }

    /// One drain step: pop exactly one notification, deliver it outside
    /// the lock, then reschedule if more are queued.
    fn drain_one(&self) {
        let (notification, subscriber) = {
            let mut state = self.state.lock();
            let Some(n) = state.pending.pop_front() else {
                state.draining = false;
                return;
            };
            if n.is_terminating() {
                // Close before the callback runs.
                state.closed = true;
                state.pending.clear();
            }
            (n, state.subscriber.take())
        };

        let Some(mut subscriber) = subscriber else {
            // Cancelled mid-drain; nothing left to deliver to.
            self.state.lock().draining = false;
            return;
        };

        let failure = match notification {
            Notification::Next(row) => {
                self.metrics.rows_delivered.fetch_add(1, Ordering::Relaxed);
                catch_unwind(AssertUnwindSafe(|| subscriber.on_next(row)))
                    .err()
                    .map(|payload| StreamError::SubscriberPanic {
                        callback: "on_next",
                        message: panic_message(payload.as_ref()),
                    })
            }
            Notification::Complete => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| subscriber.on_complete())) {
                    tracing::warn!(
                        "subscriber panicked in on_complete: {}",
                        panic_message(payload.as_ref())
                    );
                }
                None
            }
            Notification::Error(error) => {
                if let Err(payload) =
                    catch_unwind(AssertUnwindSafe(|| subscriber.on_error(error)))
                {
                    // Swallowed: the subscription is already failing.
                    tracing::warn!(
                        "subscriber panicked in on_error: {}",
                        panic_message(payload.as_ref())
                    );
                }
                None
            }
        };

        self.finish_delivery(subscriber, failure);
    }

    /// Returns the subscriber after a delivery and decides what runs next.
    fn finish_delivery(
        &self,
        subscriber: Box<dyn RowSubscriber<T>>,
        failure: Option<StreamError>,
    ) {
        let mut subscriber = subscriber;
        let mut state = self.state.lock();
        if state.closed {
            state.pending.clear();
            state.draining = false;
            let stashed = state.scheduling_failure.take();
            drop(state);
            if let Some(error) = stashed {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
                    subscriber.on_error(StreamError::Scheduling(error));
                })) {
                    tracing::warn!(
                        "subscriber panicked in on_error: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
            return;
        }

        state.subscriber = Some(subscriber);
        if let Some(error) = failure {
            // A panicking subscriber fails the subscription; whatever was
            // queued is replaced by the terminating error.
            tracing::warn!(%error, "failing subscription after subscriber panic");
            state.pending.clear();
            state.pending.push_back(Notification::Error(error));
        }
        if state.pending.is_empty() {
            state.draining = false;
        } else {
            drop(state);
            self.schedule_drain();
        }
    }
}

/// Best-effort extraction of a panic payload message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
