//! # Freshet Streaming Core
//!
//! Asynchronous, backpressure-aware result streaming for a distributed
//! column-store client: the protocol between a lazily paginated
//! server-side cursor and a pull-based subscriber.
//!
//! This crate provides:
//! - **Publisher/Subscriber contract**: single-use [`RowPublisher`],
//!   [`RowSubscriber`] callbacks, [`SubscriptionHandle`] for
//!   `request(n)` / `cancel()`
//! - **Demand accounting**: rows are produced strictly against
//!   outstanding demand, with no speculative fetching
//! - **Single-flight fetches**: at most one page fetch outstanding per
//!   subscription
//! - **Serialized delivery**: notifications arrive in order, one at a
//!   time, and a terminal signal is always last
//!
//! ## Design Principles
//!
//! 1. **Nothing blocks the caller** — `request` and `cancel` schedule
//!    work and return
//! 2. **No lock across an await** — the notification lock and the fetch
//!    flag lock are separate and held only for flag flips and queue ops
//! 3. **Executor-agnostic** — per-subscription ordering comes from the
//!    queue's own drain discipline, never from the executor
//!
//! ## Example
//!
//! ```rust,ignore
//! use freshet_core::{RowPublisher, StreamConfig, subscribe_stream};
//! use futures::StreamExt;
//!
//! let publisher = RowPublisher::new(driver.execute(statement));
//! let mut rows = subscribe_stream(&publisher, StreamConfig::default());
//! while let Some(row) = rows.next().await {
//!     handle(row?);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cursor;
pub mod error;
pub mod executor;
pub mod subscription;

pub use cursor::{RowCursor, VecCursor};
pub use error::{SourceError, StreamError};
pub use executor::{default_executor, Executor, SchedulingError, TokioExecutor};
pub use subscription::{
    subscribe_fn, subscribe_stream, RowPublisher, RowStream, RowSubscriber, StreamConfig,
    StreamMetrics, SubscriptionHandle,
};

#[cfg(test)]
pub(crate) mod testutil;
