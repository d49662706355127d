//! Structural-mutation guard
//!
//! A reconciliation pass holds a [`StructuralMutationGuard`] from start to
//! finish. Anything that must not observe a half-spliced graph (snapshots,
//! diagnostics dumps) takes the same lock first. Evaluation itself does not:
//! checks keep running and committing results while the guard is held.
//!
//! The lock is reentrant so collaborators called back on the reconciling
//! thread can still take a snapshot.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reentrant lock serializing structural mutation against observers
#[derive(Debug, Default)]
pub struct StructuralLock {
    inner: ReentrantMutex<()>,
    depth: AtomicUsize,
}

impl StructuralLock {
    /// Create an unlocked guard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is available
    pub fn lock(&self) -> StructuralMutationGuard<'_> {
        let guard = self.inner.lock();
        self.depth.fetch_add(1, Ordering::AcqRel);
        StructuralMutationGuard {
            _guard: guard,
            depth: &self.depth,
        }
    }

    /// Take the lock if no other thread holds it
    pub fn try_lock(&self) -> Option<StructuralMutationGuard<'_>> {
        let guard = self.inner.try_lock()?;
        self.depth.fetch_add(1, Ordering::AcqRel);
        Some(StructuralMutationGuard {
            _guard: guard,
            depth: &self.depth,
        })
    }

    /// Whether some thread currently holds the lock
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }
}

/// Scope of a structural mutation; released on drop
#[derive(Debug)]
#[must_use = "the structural lock is released as soon as the guard is dropped"]
pub struct StructuralMutationGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
    depth: &'a AtomicUsize,
}

impl Drop for StructuralMutationGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}
