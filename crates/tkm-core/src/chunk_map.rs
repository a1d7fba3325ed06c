//! Owned byte buffers passed between negotiation steps.
//!
//! Negotiation steps produce serialized values (nonces, Diffie-Hellman
//! public values) that a later step consumes. The chunk map is the only
//! way such a buffer moves between steps: ownership transfers into the map
//! on [`put`](ChunkMap::put) and out of it on [`take`](ChunkMap::take), so
//! a buffer is never ambiguously shared between the map and a caller.
//!
//! - `take` models single consumption: the entry is gone afterwards.
//! - `peek` models inspection without disturbing later retrieval.
//! - `put` with `overwrite == false` refuses to clobber a value a
//!   concurrent step has not yet consumed, handing the rejected buffer
//!   back through the error.
//!
//! Entries are removed only by the logical owner that inserted them; the
//! map never expires entries by time. Leaked entries are attributable to a
//! specific caller bug, not masked by a collector.
//!
//! # Thread safety
//!
//! A single `RwLock` over the table. Contention is not a concern at this
//! layer: every surrounding operation pays a key-manager round trip that
//! dwarfs any lock hold time here.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;

use crate::error::ChunkMapError;
use crate::handle::{ContextKind, Handle};

/// What a stored buffer is, relative to the handle it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkRole {
    /// A generated nonce value.
    Nonce,
    /// A serialized Diffie-Hellman public value.
    PublicValue,
    /// A serialized authentication payload.
    AuthPayload,
}

impl ChunkRole {
    const fn name(self) -> &'static str {
        match self {
            Self::Nonce => "nonce",
            Self::PublicValue => "public-value",
            Self::AuthPayload => "auth-payload",
        }
    }
}

/// Key identifying one buffer in the map.
///
/// The key space is independent of the handle pools' integer universes: a
/// key usually embeds a handle plus a role discriminator, but callers may
/// also bind buffers under free-form tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkKey {
    /// A buffer belonging to a live key-manager context.
    Context {
        /// Category of the owning context.
        kind: ContextKind,
        /// Handle of the owning context.
        handle: Handle,
        /// Which of the context's values this is.
        role: ChunkRole,
    },
    /// An application-defined binding.
    Tag(String),
}

impl ChunkKey {
    /// Key for a value belonging to a key-manager context.
    #[must_use]
    pub const fn context(kind: ContextKind, handle: Handle, role: ChunkRole) -> Self {
        Self::Context { kind, handle, role }
    }

    /// Free-form application-defined key.
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Context { kind, handle, role } => {
                write!(f, "{kind}/{handle}/{}", role.name())
            }
            Self::Tag(tag) => write!(f, "tag/{tag}"),
        }
    }
}

/// Concurrent store of owned byte buffers.
#[derive(Debug, Default)]
pub struct ChunkMap {
    chunks: RwLock<HashMap<ChunkKey, Bytes>>,
}

impl ChunkMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `buffer` under `key`, taking ownership.
    ///
    /// With `overwrite` set, an existing binding is replaced and the
    /// previous buffer is dropped.
    ///
    /// # Errors
    ///
    /// Without `overwrite`, an existing binding fails with
    /// [`ChunkMapError::KeyExists`]; the error carries `buffer` back to the
    /// caller and the map is unchanged.
    pub fn put(&self, key: ChunkKey, buffer: Bytes, overwrite: bool) -> Result<(), ChunkMapError> {
        let mut chunks = self.chunks.write().expect("lock poisoned");
        if !overwrite && chunks.contains_key(&key) {
            return Err(ChunkMapError::KeyExists { key, buffer });
        }
        chunks.insert(key, buffer);
        Ok(())
    }

    /// Remove the binding for `key` and transfer the buffer to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkMapError::NotFound`] if nothing is bound, including
    /// after a previous `take` of the same key.
    pub fn take(&self, key: &ChunkKey) -> Result<Bytes, ChunkMapError> {
        self.chunks
            .write()
            .expect("lock poisoned")
            .remove(key)
            .ok_or_else(|| ChunkMapError::NotFound { key: key.clone() })
    }

    /// Look at the buffer bound to `key` without consuming the entry.
    ///
    /// The returned [`Bytes`] is a shared view of the stored buffer; the
    /// binding remains and a later `take` still succeeds.
    #[must_use]
    pub fn peek(&self, key: &ChunkKey) -> Option<Bytes> {
        self.chunks
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
    }

    /// Discard the binding for `key` without retrieving the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkMapError::NotFound`] if nothing is bound.
    pub fn remove(&self, key: &ChunkKey) -> Result<(), ChunkMapError> {
        self.chunks
            .write()
            .expect("lock poisoned")
            .remove(key)
            .map(drop)
            .ok_or_else(|| ChunkMapError::NotFound { key: key.clone() })
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.read().expect("lock poisoned").len()
    }

    /// Whether the map holds no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
