//! Protocol error types for both key manager channels.

use std::io;

use thiserror::Error;

/// Maximum frame size in bytes (64 KiB).
///
/// Control and event messages are a few hundred bytes; the cap bounds what
/// a misbehaving peer can make the daemon allocate, and is checked before
/// any buffer is reserved.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Errors from framing, encoding, and channel lifecycle.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame length prefix exceeds [`MAX_FRAME_SIZE`].
    ///
    /// Detected before allocation.
    #[error("frame too large: {size} bytes exceeds maximum {max} bytes")]
    FrameTooLarge {
        /// Size announced by the length prefix.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },

    /// A message payload could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// The key manager answered a request with an error.
    ///
    /// Carries only the peer-supplied reason; nothing about local state is
    /// attached, so the message is safe to propagate outward.
    #[error("request rejected by key manager: {reason}")]
    Rejected {
        /// Reason given by the key manager.
        reason: String,
    },

    /// The peer answered with a response of the wrong kind.
    #[error("unexpected response: expected {expected}")]
    UnexpectedResponse {
        /// The response kind the request called for.
        expected: &'static str,
    },

    /// The peer closed the connection mid-exchange.
    #[error("connection closed")]
    ConnectionClosed,

    /// Underlying transport error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Returns `true` if the peer violated the wire protocol.
    ///
    /// A violating connection is beyond recovery and should be dropped;
    /// the peer is either buggy or hostile.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::FrameTooLarge { .. }
                | Self::Serialization { .. }
                | Self::UnexpectedResponse { .. }
        )
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
