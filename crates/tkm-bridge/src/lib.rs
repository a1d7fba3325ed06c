//! tkm-bridge - Socket plumbing and bootstrap for the trusted key manager
//!
//! This crate connects an IKE daemon to its external, privilege-separated
//! trusted key manager (TKM). The daemon talks to the key manager over two
//! Unix domain sockets:
//!
//! ```text
//! ┌────────────────┐   control socket (client)    ┌────────────────┐
//! │                │ ───────────────────────────► │                │
//! │   IKE daemon   │   reset, limits, operations  │  key manager   │
//! │  (this crate)  │                              │  (external)    │
//! │                │ ◄─────────────────────────── │                │
//! └────────────────┘   event socket (listener)    └────────────────┘
//!                      ESP SA expiry pushes
//! ```
//!
//! Bootstrap walks `Disconnected → Connected → Reset → LimitsKnown → Ready`:
//! connect the control channel, stand up the event listener, tell the key
//! manager to drop stale state, query the per-category capacities, then
//! build the [`TkmContext`] that negotiation workflows share for the life
//! of the process. A failure at any step tears down whatever was already
//! opened, in reverse order, so the daemon never starts half-initialized.
//!
//! # Modules
//!
//! - [`config`]: socket path settings with documented defaults
//! - [`protocol`]: frame codec, wire messages, control client, event listener
//! - [`bootstrap`]: the startup state machine and the resulting [`Runtime`]
//!
//! Handle pools and the chunk map themselves live in [`tkm_core`], re-exported
//! here for convenience.

pub mod bootstrap;
pub mod config;
pub mod protocol;

pub use bootstrap::{bootstrap, BootstrapError, Runtime};
pub use config::{BridgeConfig, ConfigError};
pub use tkm_core::{
    ChunkKey, ChunkMap, ChunkRole, ContextKind, Handle, IdManager, Limits, TkmContext,
};
