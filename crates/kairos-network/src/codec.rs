//! Frame codec: base64-armored wire messages with a sentinel terminator.
//!
//! ```text
//! +-------------------------------------------+------+
//! |        base64( bincode(WireMessage) )     | 0xff |
//! +-------------------------------------------+------+
//! ```
//!
//! The terminator never appears inside the base64 alphabet, so the reader
//! can scan for it without escaping.

use crate::{NetworkError, WireMessage, FRAME_TERMINATOR, MAX_FRAME_SIZE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec turning a byte stream into [`WireMessage`]s and back.
#[derive(Debug)]
pub struct FrameCodec {
    max_size: usize,
}

impl FrameCodec {
    /// Create a codec with the default frame size limit.
    pub fn new() -> Self {
        Self {
            max_size: MAX_FRAME_SIZE,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = WireMessage;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.iter().position(|&b| b == FRAME_TERMINATOR) else {
            if src.len() > self.max_size {
                return Err(NetworkError::FrameTooLarge {
                    size: src.len(),
                    max: self.max_size,
                });
            }
            return Ok(None);
        };

        let frame = src.split_to(pos + 1);
        let encoded = &frame[..pos];

        // An empty frame (lone terminator) is noise, not an error.
        if encoded.is_empty() {
            return self.decode(src);
        }

        let raw = BASE64
            .decode(encoded)
            .map_err(|e| NetworkError::InvalidFrame(format!("base64: {e}")))?;
        let message: WireMessage =
            bincode::deserialize(&raw).map_err(|e| NetworkError::Codec(e.to_string()))?;

        Ok(Some(message))
    }
}

impl Encoder<WireMessage> for FrameCodec {
    type Error = NetworkError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let raw = bincode::serialize(&item).map_err(|e| NetworkError::Codec(e.to_string()))?;
        let encoded = BASE64.encode(&raw);

        if encoded.len() > self.max_size {
            return Err(NetworkError::FrameTooLarge {
                size: encoded.len(),
                max: self.max_size,
            });
        }

        dst.reserve(encoded.len() + 1);
        dst.put_slice(encoded.as_bytes());
        dst.put_u8(FRAME_TERMINATOR);
        Ok(())
    }
}
