//! Length-prefixed frame codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::{ProtocolError, MAX_FRAME_SIZE};

const LENGTH_PREFIX_BYTES: usize = 4;

/// Codec for length-prefixed binary frames.
///
/// Each frame is a 4-byte big-endian length followed by that many payload
/// bytes. The announced length is validated against [`MAX_FRAME_SIZE`]
/// before any payload buffer is reserved.
#[derive(Debug, Default)]
pub struct FrameCodec {
    _private: (),
}

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_BYTES]);
        let length = u32::from_be_bytes(prefix) as usize;

        // Reject before reserving anything for the payload.
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }

        if src.len() < LENGTH_PREFIX_BYTES + length {
            src.reserve(LENGTH_PREFIX_BYTES + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_BYTES);
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: item.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        // Length fits in u32: MAX_FRAME_SIZE is far below u32::MAX.
        #[allow(clippy::cast_possible_truncation)]
        let length = item.len() as u32;
        dst.reserve(LENGTH_PREFIX_BYTES + item.len());
        dst.put_u32(length);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
