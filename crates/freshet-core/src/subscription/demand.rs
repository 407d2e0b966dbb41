//! Demand accounting for pull-based streaming.
//!
//! The subscriber signals how many rows it is ready to accept via
//! `request(n)`; the drain loop consumes exactly one unit of demand per
//! row delivered. The counter is the one piece of state touched from both
//! the subscriber's thread and executor tasks, so it is a lock-free
//! atomic: `add` and `try_consume` are safe under any interleaving.

use std::sync::atomic::{AtomicU64, Ordering};

/// Outstanding demand: rows requested by the subscriber but not yet
/// delivered. Never negative; additions saturate at `u64::MAX`, which by
/// convention means effectively unbounded demand.
pub(crate) struct DemandCounter {
    outstanding: AtomicU64,
}

impl DemandCounter {
    /// Creates a counter with zero outstanding demand.
    pub(crate) fn new() -> Self {
        Self {
            outstanding: AtomicU64::new(0),
        }
    }

    /// Adds `n` units of demand, saturating at `u64::MAX`.
    pub(crate) fn add(&self, n: u64) {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(n);
            match self.outstanding.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Attempts to consume one unit of demand.
    ///
    /// Returns `true` if demand was available (and decremented), `false`
    /// if outstanding demand was 0. CAS loop keeps this correct under
    /// concurrent `add` calls.
    #[inline]
    pub(crate) fn try_consume(&self) -> bool {
        loop {
            let current = self.outstanding.load(Ordering::Acquire);
            if current == 0 {
                return false;
            }
            if self
                .outstanding
                .compare_exchange_weak(current, current - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Returns the current outstanding demand.
    pub(crate) fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
