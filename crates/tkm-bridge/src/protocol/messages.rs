//! Control and event message types.
//!
//! Messages are JSON-encoded tagged enums carried in length-prefixed
//! frames ([`FrameCodec`](super::framing::FrameCodec)). The control
//! channel is request/response initiated by the daemon; the event channel
//! is request/response initiated by the key manager.
//!
//! Only the bootstrap-time control requests (reset, limits query) and the
//! expiry push are defined here; per-operation key exchange requests are
//! issued by the surrounding daemon through the gated client and are not
//! part of this layer.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tkm_core::Limits;

use super::error::{ProtocolError, ProtocolResult};

/// Requests the daemon sends on the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Drop all state left over from a previous daemon run.
    Reset,
    /// Report the per-category capacities and the request ceiling.
    QueryLimits,
}

/// Responses the key manager sends on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
    /// The request succeeded and carries no payload.
    Ack,
    /// Answer to [`ControlRequest::QueryLimits`].
    Limits(Limits),
    /// The request was refused.
    Error {
        /// Reason supplied by the key manager.
        reason: String,
    },
}

/// Requests the key manager pushes on the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRequest {
    /// An ESP security association expired inside the key manager.
    ///
    /// The daemon is expected to tear down its side of the association and
    /// release the corresponding handles.
    EspSaExpired {
        /// Security policy identifier of the expired association.
        sp_id: u64,
        /// IP protocol of the protected traffic.
        protocol: u8,
        /// Soft expiry (rekey) rather than hard removal.
        soft: bool,
    },
}

/// Responses the daemon sends on the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventResponse {
    /// The push was processed.
    Ack,
    /// The push was refused.
    Error {
        /// Why the daemon refused it.
        reason: String,
    },
}

/// Encode a message into a frame payload.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialization`] if encoding fails.
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Bytes> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| ProtocolError::Serialization {
            reason: format!("failed to encode message: {e}"),
        })
}

/// Decode a message from a frame payload.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialization`] if the payload is not a valid
/// message of the expected type.
pub fn decode_message<T: DeserializeOwned>(frame: &Bytes) -> ProtocolResult<T> {
    serde_json::from_slice(frame).map_err(|e| ProtocolError::Serialization {
        reason: format!("invalid message: {e}"),
    })
}
