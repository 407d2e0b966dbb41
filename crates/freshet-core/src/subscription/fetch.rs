//! Single-flight coordination for page fetches.
//!
//! At most one page fetch may be outstanding per subscription. The
//! in-flight flag lives under its own lock, distinct from the
//! notification-queue lock, so the fetch completion callback only ever
//! holds it for the brief flag clear and no lock is held across the
//! asynchronous network wait. Keeping the two locks separate means
//! "deliver next row" and "start next fetch" can never nest in
//! conflicting order.

use parking_lot::Mutex;

/// Guards the "a fetch is running" flag for one subscription.
pub(crate) struct FetchCoordinator {
    in_flight: Mutex<bool>,
}

impl FetchCoordinator {
    /// Creates a coordinator with no fetch in flight.
    pub(crate) fn new() -> Self {
        Self {
            in_flight: Mutex::new(false),
        }
    }

    /// Claims the single fetch slot.
    ///
    /// Returns `true` if no fetch was running (the caller now owns the
    /// slot and must eventually call [`finish`](Self::finish)), `false`
    /// if one is already outstanding.
    pub(crate) fn try_begin(&self) -> bool {
        let mut running = self.in_flight.lock();
        if *running {
            false
        } else {
            *running = true;
            true
        }
    }

    /// Releases the fetch slot.
    pub(crate) fn finish(&self) {
        *self.in_flight.lock() = false;
    }

    /// Returns `true` while a fetch is outstanding.
    pub(crate) fn is_in_flight(&self) -> bool {
        *self.in_flight.lock()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
