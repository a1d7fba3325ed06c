//! tkm-core - Key manager handle and buffer lifecycle management
//!
//! This crate tracks the daemon-side bookkeeping for cryptographic contexts
//! that live inside an external, privilege-separated trusted key manager
//! (TKM). The daemon never holds raw key material; it holds small integer
//! handles referencing contexts inside the key manager, plus opaque byte
//! buffers (serialized nonces, public values) that negotiation steps hand
//! to each other.
//!
//! Everything here is synchronous and I/O-free. Establishing the channels
//! to the key manager and learning the per-category capacities is the job
//! of the `tkm-bridge` crate; this crate is handed a [`Limits`] descriptor
//! and manages handle uniqueness and buffer ownership from there.
//!
//! # Modules
//!
//! - [`handle`]: [`ContextKind`] categories and the [`Handle`] newtype
//! - [`limits`]: per-category capacities served by the key manager
//! - [`id_pool`]: capacity-bounded, lowest-available handle allocator
//! - [`id_manager`]: one pool per category behind a uniform contract
//! - [`chunk_map`]: owned byte buffers keyed by handle and role
//! - [`context`]: the runtime context aggregating manager and map
//! - [`error`]: structured error types for all of the above

pub mod chunk_map;
pub mod context;
pub mod error;
pub mod handle;
pub mod id_manager;
pub mod id_pool;
pub mod limits;

pub use chunk_map::{ChunkKey, ChunkMap, ChunkRole};
pub use context::TkmContext;
pub use error::{ChunkMapError, InvalidHandleReason, InvalidKind, PoolError, PoolResult};
pub use handle::{ContextKind, Handle};
pub use id_manager::IdManager;
pub use id_pool::IdPool;
pub use limits::Limits;
