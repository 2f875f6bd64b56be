//! Non-blocking lock used to coalesce checkpoints.

use std::sync::atomic::{AtomicBool, Ordering};

/// A lock that is only ever tried, never waited on.
///
/// A caller that fails to acquire it skips its checkpoint; the holder's
/// checkpoint already covers the same state.
#[derive(Debug, Default)]
pub struct PersistLock {
    held: AtomicBool,
}

impl PersistLock {
    /// Create a released lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Acquire the lock if it is free.
    ///
    /// The lock is released when the returned guard is dropped.
    #[must_use]
    pub fn try_acquire(&self) -> Option<PersistGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| PersistGuard { lock: self })
    }

    /// Whether a checkpoint currently holds the lock.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of holding a [`PersistLock`].
#[derive(Debug)]
pub struct PersistGuard<'a> {
    lock: &'a PersistLock,
}

impl Drop for PersistGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
