//! Per-location critical sections

use dashmap::DashMap;
use parking_lot::Mutex;
use preservo_common::LocationId;
use std::sync::Arc;

/// Lazily populated table of one mutex per location.
///
/// Entries are never evicted; the table grows with the number of distinct
/// locations, which is catalog-sized.
#[derive(Default)]
pub struct LocationLocks {
    locks: DashMap<LocationId, Arc<Mutex<()>>>,
}

impl LocationLocks {
    /// Create an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the location's mutex.
    ///
    /// The mutex is released when `f` returns, whether with a value, an
    /// error, or by unwinding.
    pub fn with_lock<R>(&self, location: &LocationId, f: impl FnOnce() -> R) -> R {
        // Clone the Arc out so the map shard is not held while waiting.
        let mutex = Arc::clone(
            self.locks
                .entry(location.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = mutex.lock();
        f()
    }

    /// Whether some caller is currently inside the location's section
    #[must_use]
    pub fn is_locked(&self, location: &LocationId) -> bool {
        self.locks.get(location).is_some_and(|m| m.is_locked())
    }

    /// Number of locations seen so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no location has been locked yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
