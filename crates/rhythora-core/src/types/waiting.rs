//! Counter of in-flight loads, backing the UI loading indicator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared count of outstanding fetch/decode operations.
#[derive(Debug, Clone, Default)]
pub struct WaitingCounter(Arc<AtomicUsize>);

impl WaitingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations currently waiting.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_waiting(&self) -> bool {
        self.count() > 0
    }

    /// Start waiting. The count drops again when the guard is dropped,
    /// whichever way the operation ends.
    pub fn begin(&self) -> WaitGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        WaitGuard(self.0.clone())
    }
}

/// Decrements the waiting counter on drop.
#[derive(Debug)]
#[must_use = "the wait ends as soon as the guard is dropped"]
pub struct WaitGuard(Arc<AtomicUsize>);

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
