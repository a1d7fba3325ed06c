//! Uniform acquire/release contract over all six context categories.
//!
//! One [`IdPool`] per [`ContextKind`], each behind its own lock so two
//! categories never contend with each other. Within a category, acquire and
//! release are atomic with respect to one another: two concurrent acquires
//! never return the same handle, and a release concurrent with an acquire
//! never produces torn occupancy.
//!
//! The manager is constructed once from the [`Limits`] the key manager
//! served at bootstrap and lives until daemon shutdown. Handles still
//! allocated at that point are a caller-responsibility violation: they are
//! logged and discarded, never allowed to block shutdown.

use std::sync::Mutex;

use tracing::warn;

use crate::error::PoolResult;
use crate::handle::{ContextKind, Handle};
use crate::id_pool::IdPool;
use crate::limits::Limits;

/// Thread-safe owner of the six per-category handle pools.
#[derive(Debug)]
pub struct IdManager {
    pools: [Mutex<IdPool>; 6],
    limits: Limits,
}

impl IdManager {
    /// Build the pools from the key manager's limits.
    ///
    /// Never fails: a capacity of zero in a category just means that
    /// category fails `acquire` with `Exhausted` forever.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            pools: ContextKind::ALL
                .map(|kind| Mutex::new(IdPool::new(kind, limits.capacity(kind)))),
            limits,
        }
    }

    /// Read-only view of the limits this manager was built from.
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Allocate the smallest free handle in `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Exhausted`](crate::error::PoolError::Exhausted)
    /// when every handle in the category is live.
    pub fn acquire(&self, kind: ContextKind) -> PoolResult<Handle> {
        self.pool(kind).acquire()
    }

    /// Release a handle back to its category.
    ///
    /// # Errors
    ///
    /// Returns
    /// [`PoolError::InvalidHandle`](crate::error::PoolError::InvalidHandle)
    /// on double release or an out-of-range value.
    pub fn release(&self, kind: ContextKind, handle: Handle) -> PoolResult<()> {
        self.pool(kind).release(handle)
    }

    /// Whether `handle` is currently allocated in `kind`. No side effects.
    #[must_use]
    pub fn is_allocated(&self, kind: ContextKind, handle: Handle) -> bool {
        self.pool(kind).is_allocated(handle)
    }

    /// Number of live handles in `kind`.
    #[must_use]
    pub fn allocated_count(&self, kind: ContextKind) -> usize {
        self.pool(kind).allocated_count()
    }

    fn pool(&self, kind: ContextKind) -> std::sync::MutexGuard<'_, IdPool> {
        self.pools[kind.index()].lock().expect("lock poisoned")
    }
}

impl Drop for IdManager {
    fn drop(&mut self) {
        for pool in &self.pools {
            // A poisoned lock here means a panic is already unwinding;
            // leak accounting is best-effort on that path.
            let Ok(pool) = pool.lock() else { continue };
            let leaked = pool.allocated_count();
            if leaked > 0 {
                warn!(
                    kind = %pool.kind(),
                    leaked,
                    "handles still allocated at shutdown; caller failed to release"
                );
            }
        }
    }
}
