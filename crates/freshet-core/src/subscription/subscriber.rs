//! Subscriber-side contract and closure-based convenience.
//!
//! Implement [`RowSubscriber`] for full control over demand, or use
//! [`subscribe_fn`] when a per-row closure with unbounded demand is
//! enough. Callbacks are always invoked one at a time, in order, by the
//! subscription's delivery loop; they may call back into the
//! [`SubscriptionHandle`] freely (demand processing is scheduled, never
//! run on the callback's own stack).

use crate::error::StreamError;
use crate::subscription::publisher::RowPublisher;
use crate::subscription::subscription::SubscriptionHandle;

// ---------------------------------------------------------------------------
// RowSubscriber
// ---------------------------------------------------------------------------

/// Receives the notifications of one subscription.
///
/// Exactly one of `on_error` / `on_complete` is ever invoked, always
/// last; `on_next` runs once per requested-and-delivered row, in cursor
/// order. A panic from `on_next` fails the subscription with
/// [`StreamError::SubscriberPanic`]; panics from the terminal callbacks
/// are caught and logged.
pub trait RowSubscriber<T: Send + 'static>: Send + 'static {
    /// Called exactly once, before any other callback, with the handle
    /// used to request rows and cancel.
    ///
    /// Nothing is delivered until demand is requested, either here or
    /// later through a retained handle.
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>);

    /// Called once per delivered row.
    fn on_next(&mut self, row: T);

    /// Terminal failure callback.
    ///
    /// Default implementation logs the error via `tracing::warn!`.
    fn on_error(&mut self, error: StreamError) {
        tracing::warn!(%error, "subscription failed");
    }

    /// Terminal success callback. Default is a no-op.
    fn on_complete(&mut self) {}
}

// ---------------------------------------------------------------------------
// FnSubscriber (private adapter)
// ---------------------------------------------------------------------------

/// Adapter wrapping a closure into a [`RowSubscriber`] with effectively
/// unbounded demand.
struct FnSubscriber<F> {
    on_row: F,
}

impl<T, F> RowSubscriber<T> for FnSubscriber<F>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>) {
        subscription.request(u64::MAX);
    }

    fn on_next(&mut self, row: T) {
        (self.on_row)(row);
    }
}

/// Subscribes with a closure invoked for every row.
///
/// Demand is effectively unbounded (`u64::MAX`), so the driver paces
/// delivery only by page round trips; use the full [`RowSubscriber`]
/// trait or the stream adapter when backpressure matters. Errors are
/// logged through the trait's default `on_error`.
pub fn subscribe_fn<T, F>(publisher: &RowPublisher<T>, on_row: F)
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    publisher.subscribe(FnSubscriber { on_row });
}

// ===========================================================================
// Tests
// ===========================================================================
