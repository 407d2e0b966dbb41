//! Async `Stream` adapter — [`RowStream`].
//!
//! Wraps a [`RowPublisher`] in a `futures`-compatible `Stream`, enabling
//! idiomatic consumption with combinators like `.map()`, `.take()`, and
//! `.collect()`. Demand stays bounded: the adapter requests
//! [`StreamConfig::prefetch`] rows up front and replenishes at the half
//! watermark as rows are polled out, so the in-flight row count never
//! exceeds the prefetch window.
//!
//! # Implementation Note
//!
//! Polling delegates to a [`UnboundedReceiverStream`] fed by an internal
//! subscriber, which integrates with the async machinery for correct
//! wakeups. The channel is unbounded but its occupancy is bounded by the
//! requested demand. Dropping the stream cancels the subscription.
//!
//! # Usage
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let mut rows = subscribe_stream(&publisher, StreamConfig::default());
//! while let Some(row) = rows.next().await {
//!     process(row?);
//! }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::StreamError;
use crate::subscription::publisher::RowPublisher;
use crate::subscription::subscriber::RowSubscriber;
use crate::subscription::subscription::SubscriptionHandle;

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Configuration for [`RowStream`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Rows requested ahead of consumption. Balances round-trip hiding
    /// (enough rows in flight to keep the consumer busy) against memory
    /// (the adapter buffers at most this many undelivered rows).
    pub prefetch: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { prefetch: 64 }
    }
}

// ---------------------------------------------------------------------------
// StreamSubscriber (private bridge)
// ---------------------------------------------------------------------------

enum StreamSignal<T> {
    Row(T),
    Failed(StreamError),
    Finished,
}

type HandleSlot<T> = Arc<Mutex<Option<SubscriptionHandle<T>>>>;

struct StreamSubscriber<T: Send + 'static> {
    sender: mpsc::UnboundedSender<StreamSignal<T>>,
    handle_slot: HandleSlot<T>,
    prefetch: u64,
}

impl<T: Send + 'static> RowSubscriber<T> for StreamSubscriber<T> {
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>) {
        subscription.request(self.prefetch);
        *self.handle_slot.lock() = Some(subscription);
    }

    fn on_next(&mut self, row: T) {
        // A dropped receiver means the stream is gone; its Drop already
        // cancelled the subscription.
        let _ = self.sender.send(StreamSignal::Row(row));
    }

    fn on_error(&mut self, error: StreamError) {
        let _ = self.sender.send(StreamSignal::Failed(error));
    }

    fn on_complete(&mut self) {
        let _ = self.sender.send(StreamSignal::Finished);
    }
}

// ---------------------------------------------------------------------------
// RowStream
// ---------------------------------------------------------------------------

/// Async stream over one subscription's rows.
///
/// Yields `Ok(row)` per delivered row and at most one `Err(_)` as the
/// final item on failure; completion ends the stream. All fields are
/// `Unpin`, so the struct works directly with `tokio::select!` without
/// explicit pinning. Dropping the stream cancels the subscription.
pub struct RowStream<T: Send + 'static> {
    inner: UnboundedReceiverStream<StreamSignal<T>>,
    handle_slot: HandleSlot<T>,
    /// Replenish demand after this many rows have been polled out.
    replenish_at: u64,
    yielded_since_request: u64,
    terminated: bool,
}

impl<T: Send + 'static> RowStream<T> {
    /// Returns `true` once the stream has yielded its last item.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Cancels the subscription and terminates the stream.
    ///
    /// Subsequent polls return `None`.
    pub fn cancel(&mut self) {
        if !self.terminated {
            self.terminated = true;
            if let Some(handle) = self.handle_slot.lock().take() {
                handle.cancel();
            }
        }
    }
}

impl<T: Send + 'static> Stream for RowStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.terminated {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(StreamSignal::Row(row))) => {
                this.yielded_since_request += 1;
                if this.yielded_since_request >= this.replenish_at {
                    if let Some(handle) = this.handle_slot.lock().as_ref() {
                        handle.request(this.yielded_since_request);
                    }
                    this.yielded_since_request = 0;
                }
                Poll::Ready(Some(Ok(row)))
            }
            Poll::Ready(Some(StreamSignal::Failed(error))) => {
                this.terminated = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(StreamSignal::Finished)) | Poll::Ready(None) => {
                this.terminated = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Send + 'static> Drop for RowStream<T> {
    fn drop(&mut self) {
        if !self.terminated {
            if let Some(handle) = self.handle_slot.lock().take() {
                handle.cancel();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Subscribes to the publisher and returns the rows as an async stream.
///
/// Subscribing to a publisher that already has a subscriber yields a
/// single `Err(`[`StreamError::AlreadySubscribed`]`)`.
pub fn subscribe_stream<T: Send + 'static>(
    publisher: &RowPublisher<T>,
    config: StreamConfig,
) -> RowStream<T> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let handle_slot: HandleSlot<T> = Arc::new(Mutex::new(None));
    let prefetch = config.prefetch.max(1) as u64;

    publisher.subscribe(StreamSubscriber {
        sender,
        handle_slot: Arc::clone(&handle_slot),
        prefetch,
    });

    RowStream {
        inner: UnboundedReceiverStream::new(receiver),
        handle_slot,
        replenish_at: (prefetch / 2).max(1),
        yielded_since_request: 0,
        terminated: false,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
