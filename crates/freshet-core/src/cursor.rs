//! Paged cursor interface to the driver layer.
//!
//! A [`RowCursor`] is the whole contract the streaming core consumes from
//! the query/driver layer: a buffer of already-decoded rows plus a
//! capability to fetch the next page asynchronously. Everything else the
//! driver does (statement preparation, connection pooling, retries,
//! consistency) stays on its side of this trait.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::error::StreamError;

// ---------------------------------------------------------------------------
// RowCursor
// ---------------------------------------------------------------------------

/// A lazily paginated server-side result.
///
/// Implementations use interior mutability: the subscription machinery
/// holds the cursor behind `Arc<dyn RowCursor>` and drives it from
/// executor tasks, so both row consumption and fetch completion mutate
/// shared state.
///
/// # Fetch contract
///
/// The future returned by [`fetch_more`](Self::fetch_more) must resolve
/// successfully only once new rows are buffered or
/// [`is_fully_fetched`](Self::is_fully_fetched) has become `true`.
/// Resolving with neither condition satisfied stalls the subscription
/// forever; this is a contract on the driver adapter, not something the
/// core can enforce.
pub trait RowCursor: Send + Sync + 'static {
    /// The decoded row type produced by this cursor.
    type Row: Send + 'static;

    /// Number of rows that [`try_next`](Self::try_next) can return
    /// without a network round trip.
    fn available(&self) -> usize;

    /// Returns `true` once the server has confirmed there are no further
    /// pages.
    ///
    /// May be `true` while buffered rows remain; it speaks only about
    /// pages still on the server.
    fn is_fully_fetched(&self) -> bool;

    /// Takes the next buffered row, or `None` when the buffer is empty.
    fn try_next(&self) -> Option<Self::Row>;

    /// Starts an asynchronous fetch of the next page.
    ///
    /// Only called while `is_fully_fetched()` is `false` and never
    /// concurrently with itself for the same subscription (single-flight
    /// is enforced by the caller).
    fn fetch_more(&self) -> BoxFuture<'static, Result<(), StreamError>>;
}

// ---------------------------------------------------------------------------
// VecCursor
// ---------------------------------------------------------------------------

/// A cursor over pre-materialized pages.
///
/// The first page is buffered immediately; each `fetch_more` call loads
/// the next page without I/O. Useful for adapting fully-buffered results
/// to the streaming API and as a deterministic cursor in tests.
pub struct VecCursor<T> {
    inner: Arc<Mutex<VecCursorState<T>>>,
}

struct VecCursorState<T> {
    buffered: VecDeque<T>,
    pages: VecDeque<Vec<T>>,
}

impl<T: Send + 'static> VecCursor<T> {
    /// Creates a cursor over the given pages.
    ///
    /// An empty page list behaves as an empty, fully fetched result.
    #[must_use]
    pub fn new(pages: Vec<Vec<T>>) -> Self {
        let mut pages: VecDeque<Vec<T>> = pages.into_iter().collect();
        let buffered: VecDeque<T> = pages.pop_front().unwrap_or_default().into();
        Self {
            inner: Arc::new(Mutex::new(VecCursorState { buffered, pages })),
        }
    }
}

impl<T> Clone for VecCursor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> RowCursor for VecCursor<T> {
    type Row = T;

    fn available(&self) -> usize {
        self.inner.lock().buffered.len()
    }

    fn is_fully_fetched(&self) -> bool {
        self.inner.lock().pages.is_empty()
    }

    fn try_next(&self) -> Option<T> {
        self.inner.lock().buffered.pop_front()
    }

    fn fetch_more(&self) -> BoxFuture<'static, Result<(), StreamError>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let mut state = inner.lock();
            if let Some(page) = state.pages.pop_front() {
                state.buffered.extend(page);
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// FailedCursor
// ---------------------------------------------------------------------------

/// Cursor standing in for a result whose query failed upstream.
///
/// Reports zero buffered rows and *not* fully fetched, so any pending
/// demand reaches the fetch path; each fetch attempt yields the captured
/// error, which terminates the subscription through the normal error
/// channel. This keeps error delivery uniform whether the failure
/// happened before or after subscription.
pub(crate) struct FailedCursor<T> {
    error: StreamError,
    _rows: PhantomData<fn() -> T>,
}

impl<T> FailedCursor<T> {
    pub(crate) fn new(error: StreamError) -> Self {
        Self {
            error,
            _rows: PhantomData,
        }
    }
}

impl<T: Send + 'static> RowCursor for FailedCursor<T> {
    type Row = T;

    fn available(&self) -> usize {
        0
    }

    fn is_fully_fetched(&self) -> bool {
        false
    }

    fn try_next(&self) -> Option<T> {
        None
    }

    fn fetch_more(&self) -> BoxFuture<'static, Result<(), StreamError>> {
        let error = self.error.clone();
        Box::pin(std::future::ready(Err(error)))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
