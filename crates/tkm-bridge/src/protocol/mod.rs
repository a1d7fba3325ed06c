//! Wire protocol for both key manager channels.
//!
//! Both channels speak the same framing: length-prefixed JSON messages
//! over a Unix domain socket.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Control / event messages                │  serde_json (messages)
//! ├──────────────────────────────────────────┤
//! │  Framing                                 │  length-prefixed
//! ├──────────────────────────────────────────┤
//! │  UDS transport                           │  Unix socket
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Wire format
//!
//! ```text
//! +----------------------------+------------------+
//! | Length (4 bytes, BE)       | Payload          |
//! +----------------------------+------------------+
//! ```
//!
//! The length prefix is validated against [`MAX_FRAME_SIZE`] before any
//! allocation. Control traffic is small; the cap exists so a misbehaving
//! peer cannot make the daemon allocate unbounded memory.
//!
//! # Module overview
//!
//! - [`error`]: protocol error types ([`ProtocolError`], [`ProtocolResult`])
//! - [`framing`]: length-prefixed frame codec ([`FrameCodec`])
//! - [`messages`]: control and event message types
//! - [`client`]: control-channel client ([`ControlClient`])
//! - [`listener`]: event-channel listener ([`EventListener`])

pub mod client;
pub mod error;
pub mod framing;
pub mod listener;
pub mod messages;

pub use client::{ControlClient, SharedControlClient};
pub use error::{ProtocolError, ProtocolResult, MAX_FRAME_SIZE};
pub use framing::FrameCodec;
pub use listener::{EventHandler, EventListener, EventListenerHandle};
pub use messages::{
    decode_message, encode_message, ControlRequest, ControlResponse, EventRequest, EventResponse,
};
