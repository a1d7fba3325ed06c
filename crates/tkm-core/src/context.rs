//! Runtime context shared by negotiation workflows.

use crate::chunk_map::ChunkMap;
use crate::id_manager::IdManager;
use crate::limits::Limits;

/// The daemon-side view of the key manager's resources.
///
/// Constructed once, after bootstrap has learned the [`Limits`], and passed
/// by reference (typically inside an `Arc`) to every negotiation workflow
/// and to the event-channel handler. There is deliberately no process-wide
/// accessor: the context is reachable only through whoever owns the
/// bootstrap result, so use-after-shutdown is unrepresentable rather than
/// merely forbidden.
///
/// Shutdown quiescence is the surrounding daemon's job: the context may be
/// dropped concurrently with in-flight operations only once no new
/// negotiations are being admitted.
#[derive(Debug)]
pub struct TkmContext {
    id_manager: IdManager,
    chunk_map: ChunkMap,
}

impl TkmContext {
    /// Build the context from the limits served by the key manager.
    ///
    /// Pure local allocation; cannot fail.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            id_manager: IdManager::new(limits),
            chunk_map: ChunkMap::new(),
        }
    }

    /// Handle allocator for all six categories.
    #[must_use]
    pub const fn id_manager(&self) -> &IdManager {
        &self.id_manager
    }

    /// Buffer store for values in flight between negotiation steps.
    #[must_use]
    pub const fn chunk_map(&self) -> &ChunkMap {
        &self.chunk_map
    }
}
