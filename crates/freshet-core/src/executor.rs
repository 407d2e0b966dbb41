//! Task-scheduling substrate for asynchronous streaming work.
//!
//! Every asynchronous step of a subscription (notification delivery,
//! demand processing, page-fetch completion) runs as a task submitted to
//! an [`Executor`]. The contract is deliberately weak: tasks submitted to
//! the executor eventually run, each to completion, with no ordering
//! guarantee across tasks. Per-subscription ordering is provided by the
//! subscription's own locking, never by the executor.
//!
//! Construction-time injection replaces any runtime discovery of a shared
//! pool: callers pass an executor explicitly, or [`default_executor`]
//! picks the ambient tokio runtime and falls back to a process-wide pool
//! with process lifetime (no explicit teardown).

use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;

// ---------------------------------------------------------------------------
// SchedulingError
// ---------------------------------------------------------------------------

/// The execution substrate could not accept more work.
///
/// A subscription treats this as fatal: the failure is reported directly
/// to the subscriber, bypassing the notification queue whose own delivery
/// mechanism just failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("executor rejected task: {reason}")]
pub struct SchedulingError {
    /// Why the task was rejected.
    pub reason: String,
}

impl SchedulingError {
    /// Creates a scheduling error with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// A task-scheduling capability.
///
/// Implementations must be safe to call from any thread, including from
/// within a task they are currently running.
pub trait Executor: Send + Sync + 'static {
    /// Submits a task for eventual execution.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError`] if the substrate cannot accept more
    /// work (shut down, saturated beyond recovery). The task is dropped
    /// in that case.
    fn execute(&self, task: BoxFuture<'static, ()>) -> Result<(), SchedulingError>;
}

// ---------------------------------------------------------------------------
// TokioExecutor
// ---------------------------------------------------------------------------

/// Executor backed by a tokio runtime handle.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    /// Creates an executor from an explicit runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates an executor from the runtime the caller is running inside.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError`] when called outside a tokio runtime.
    pub fn current() -> Result<Self, SchedulingError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|_| SchedulingError::new("no tokio runtime in scope"))
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: BoxFuture<'static, ()>) -> Result<(), SchedulingError> {
        // A handle to a shut-down runtime silently drops the task rather
        // than reporting failure; the fallback pool below lives for the
        // whole process, so that only affects caller-owned runtimes.
        self.handle.spawn(task);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// default_executor
// ---------------------------------------------------------------------------

/// Returns the process-wide default executor.
///
/// Prefers the tokio runtime the caller is already inside; otherwise
/// lazily builds a shared multi-thread runtime that lives for the rest of
/// the process.
#[must_use]
pub fn default_executor() -> Arc<dyn Executor> {
    if let Ok(exec) = TokioExecutor::current() {
        return Arc::new(exec);
    }

    static FALLBACK: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    let runtime = FALLBACK.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .thread_name("freshet-stream")
            .build()
            .expect("failed to build fallback streaming runtime")
    });
    Arc::new(TokioExecutor::new(runtime.handle().clone()))
}

// ===========================================================================
// Tests
// ===========================================================================
