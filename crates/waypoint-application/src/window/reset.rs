//! Runtime reset hook invoked after a restore.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Tears down and rebuilds whatever in-memory state the host keeps, so it
/// is re-read from the freshly restored store.
pub trait RuntimeReset: Send + Sync {
    fn reset(&self);
}

/// Counts resets without doing anything else. Useful for hosts with no
/// in-memory state and for tests.
#[derive(Debug, Default)]
pub struct CountingReset {
    count: AtomicUsize,
}

impl CountingReset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RuntimeReset for CountingReset {
    fn reset(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        tracing::info!("[RuntimeReset] Runtime reset requested");
    }
}
