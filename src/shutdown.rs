//! Cooperative shutdown signal shared across the thread graph
//!
//! Acquisition threads observe the signal between acquisition cycles and
//! exit their loop; they are never killed while holding the shared
//! configuration reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clonable shutdown flag. Cheap to check on the hot path.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}
