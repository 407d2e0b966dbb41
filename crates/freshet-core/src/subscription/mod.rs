//! # Reactive Result Streaming
//!
//! The pull-based streaming pipeline between a paginated server-side
//! cursor and a subscriber: demand accounting, single-flight page
//! fetches, and a per-subscription serialized notification loop.
//!
//! ## Architecture
//!
//! ```text
//! driver future ──► RowPublisher ──► RowSubscription ──► NotificationQueue ──► subscriber
//!                   (single-use)     demand + fetch       ordered, one at
//!                                    orchestration        a time, terminal
//!                                                         is always last
//! ```
//!
//! ## Types
//!
//! - [`RowPublisher`] — bridges a future-valued cursor to one subscriber
//! - [`RowSubscriber`] — the callback contract (`on_subscribe` /
//!   `on_next` / `on_error` / `on_complete`)
//! - [`SubscriptionHandle`] — `request(n)` / `cancel()`
//! - [`RowStream`] — `futures::Stream` adapter with bounded prefetch
//! - [`StreamMetrics`] — per-subscription atomic counters

mod demand;
mod fetch;
mod notification;
mod publisher;
mod stream;
mod subscriber;
mod subscription;

pub use publisher::RowPublisher;
pub use stream::{subscribe_stream, RowStream, StreamConfig};
pub use subscriber::{subscribe_fn, RowSubscriber};
pub use subscription::{StreamMetrics, SubscriptionHandle};
