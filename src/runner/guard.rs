//! Single-active-session guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flag recording whether a session is active on one coordinator.
///
/// Checked and set atomically; a second acquire while held fails
/// immediately instead of waiting.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot(Arc<AtomicBool>);

impl SessionSlot {
    /// Create a free slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or `None` when a session already holds it.
    #[must_use]
    pub fn try_acquire(&self) -> Option<SessionGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionGuard(Arc::clone(&self.0)))
    }

    /// Whether a session currently holds the slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases its [`SessionSlot`] when dropped.
#[derive(Debug)]
pub struct SessionGuard(Arc<AtomicBool>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
