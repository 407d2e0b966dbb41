//! Error types for the result-streaming layer.
//!
//! Everything that can go wrong inside a subscription is funneled into a
//! single [`StreamError`] and delivered to the subscriber through its
//! `on_error` callback. Driver-side causes (a failed page fetch, a failed
//! query) arrive as opaque [`SourceError`] values wrapped in
//! [`StreamError::Fetch`].

use std::sync::Arc;

use crate::executor::SchedulingError;

/// Opaque driver-side error carried through the streaming layer.
///
/// Shared via `Arc` because a captured upstream failure is re-yielded on
/// every subsequent fetch attempt against the failed result.
pub type SourceError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced to subscribers through the `on_error` channel.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum StreamError {
    /// `request(n)` was called with `n == 0`.
    ///
    /// The demand protocol requires strictly positive demand; a zero
    /// request terminates the subscription with this error.
    #[error("illegal demand: request(n) requires n > 0")]
    IllegalDemand,

    /// A second subscriber attached to a single-use publisher.
    #[error("multiple subscriptions to the same result are not supported")]
    AlreadySubscribed,

    /// A page fetch (or the query producing the first page) failed.
    #[error("page fetch failed: {0}")]
    Fetch(#[source] SourceError),

    /// A subscriber callback panicked while a row was being delivered.
    #[error("subscriber panicked in {callback}: {message}")]
    SubscriberPanic {
        /// Which callback panicked (`on_next`, `on_complete`, ...).
        callback: &'static str,
        /// The panic payload, stringified when possible.
        message: String,
    },

    /// The task executor refused new work; the subscription cannot make
    /// further progress.
    #[error("streaming task unschedulable: {0}")]
    Scheduling(#[from] SchedulingError),
}

impl StreamError {
    /// Wraps a driver-side error as a fetch failure.
    pub fn fetch(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Fetch(Arc::new(source))
    }

    /// Returns `true` for errors caused by the subscriber itself
    /// violating the streaming protocol.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::IllegalDemand | Self::AlreadySubscribed)
    }
}
