//! Structured error types for handle and buffer management.
//!
//! Errors here fall into two classes with different handling policies:
//!
//! - **Recoverable conditions** a negotiation workflow is expected to handle
//!   as part of normal sequencing: [`PoolError::Exhausted`],
//!   [`ChunkMapError::KeyExists`], [`ChunkMapError::NotFound`]. These never
//!   escalate beyond the calling workflow.
//! - **Caller misuse**: [`PoolError::InvalidHandle`] (double release, out of
//!   range). These indicate a bug in the calling workflow and are reported
//!   loudly rather than silently tolerated, because tolerating them could let
//!   two workflows use the same key-manager context unknowingly.

use bytes::Bytes;
use thiserror::Error;

use crate::chunk_map::ChunkKey;
use crate::handle::{ContextKind, Handle};

/// Why a handle was rejected by [`release`](crate::id_pool::IdPool::release).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidHandleReason {
    /// The handle is outside `[0, capacity)` for this category.
    OutOfRange,
    /// The handle is not currently allocated (double release).
    NotAllocated,
}

impl std::fmt::Display for InvalidHandleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange => f.write_str("out of range"),
            Self::NotAllocated => f.write_str("not allocated"),
        }
    }
}

/// Errors from handle pool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every handle in the category is currently allocated.
    ///
    /// Recoverable: the caller backs off, retries later, or rejects the new
    /// negotiation. Never fatal to the process.
    #[error("{kind} handle pool exhausted: all {capacity} handles allocated")]
    Exhausted {
        /// Category whose pool is full.
        kind: ContextKind,
        /// Configured capacity of that pool.
        capacity: u64,
    },

    /// The handle cannot be released in its current state.
    ///
    /// Caller misuse: out of range, or already free. Refused and logged,
    /// never silently tolerated.
    #[error("invalid {kind} handle {handle}: {reason}")]
    InvalidHandle {
        /// Category the release was addressed to.
        kind: ContextKind,
        /// The offending handle value.
        handle: Handle,
        /// Why the handle was rejected.
        reason: InvalidHandleReason,
    },
}

impl PoolError {
    /// Returns `true` if the caller may retry later with the same inputs.
    ///
    /// Exhaustion clears when another workflow releases a handle; an invalid
    /// handle is a bug that retrying will not fix.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors from chunk map operations.
///
/// Both variants are expected, recoverable conditions the caller must handle
/// as part of normal negotiation-step sequencing.
#[derive(Debug, Error)]
pub enum ChunkMapError {
    /// The key is already bound and overwrite was not requested.
    ///
    /// Ownership of the rejected buffer returns to the caller through the
    /// error; the map is unchanged.
    #[error("chunk key {key} already bound")]
    KeyExists {
        /// The key that was already present.
        key: ChunkKey,
        /// The buffer the caller tried to insert, returned untouched.
        buffer: Bytes,
    },

    /// No buffer is bound to the key.
    #[error("no chunk bound to key {key}")]
    NotFound {
        /// The key that was looked up.
        key: ChunkKey,
    },
}

/// A wire-level category discriminant that names no category.
///
/// Only produced at the protocol boundary; inside the daemon, categories are
/// [`ContextKind`] values and this condition is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid context kind discriminant {value}")]
pub struct InvalidKind {
    /// The discriminant that failed to decode.
    pub value: u8,
}
