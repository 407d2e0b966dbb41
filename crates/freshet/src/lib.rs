//! # Freshet
//!
//! Reactive result streaming for a distributed column-store client.
//!
//! Freshet turns a lazily paginated query result (a page of decoded rows
//! plus a handle that can fetch more) into a pull-based stream with
//! strict backpressure: rows are produced only against demand the
//! consumer has explicitly requested, page fetches are single-flight, and
//! every subscription ends with exactly one terminal signal.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use freshet::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The driver yields a future that resolves to a RowCursor once
//!     // the first page has arrived.
//!     let publisher = RowPublisher::new(driver.execute("SELECT * FROM trades"));
//!
//!     let mut rows = subscribe_stream(&publisher, StreamConfig::default());
//!     while let Some(row) = rows.next().await {
//!         process(row?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For full control over demand, implement [`RowSubscriber`] and call
//! [`RowPublisher::subscribe`]; the handle delivered to `on_subscribe`
//! drives `request(n)` and `cancel()`.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export the streaming core
pub use freshet_core::{cursor, error, executor, subscription};

pub use freshet_core::cursor::{RowCursor, VecCursor};
pub use freshet_core::error::{SourceError, StreamError};
pub use freshet_core::executor::{default_executor, Executor, SchedulingError, TokioExecutor};
pub use freshet_core::subscription::{
    subscribe_fn, subscribe_stream, RowPublisher, RowStream, RowSubscriber, StreamConfig,
    StreamMetrics, SubscriptionHandle,
};

/// Commonly used types, traits, and macros.
///
/// ```rust,ignore
/// use freshet::prelude::*;
/// ```
pub mod prelude {
    // Streaming
    pub use freshet_core::cursor::{RowCursor, VecCursor};
    pub use freshet_core::error::StreamError;
    pub use freshet_core::subscription::{
        subscribe_fn, subscribe_stream, RowPublisher, RowStream, RowSubscriber, StreamConfig,
        SubscriptionHandle,
    };

    // Futures (commonly needed to consume RowStream)
    pub use futures::{Stream, StreamExt};

    // Standard library re-exports for convenience
    pub use std::sync::Arc;
}
