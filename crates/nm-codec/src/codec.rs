//! Length-prefixed JSON framing: each frame is a 4-byte little-endian length
//! followed by that many bytes of UTF-8 JSON.
//!
//! A peer bug must never kill the transport, so decode problems inside a
//! frame (bad JSON, oversized length) surface as [`Frame::Malformed`] items
//! rather than stream errors; the decoder stays byte-synchronized by
//! skipping exactly the advertised length.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::message::Message;

/// Browser-side limit on a single native message.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug)]
pub enum Frame {
    Message(Box<Message>),
    /// A frame that was skipped: its advertised length and why.
    Malformed { len: usize, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("outgoing message of {0} bytes exceeds the 1 MiB frame limit")]
    FrameTooLarge(usize),
    #[error("JSON encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct NativeMessageCodec {
    /// Bytes of an oversized frame still to be discarded.
    discard: usize,
}

impl Decoder for NativeMessageCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if self.discard > 0 {
            let n = self.discard.min(src.len());
            src.advance(n);
            self.discard -= n;
            if self.discard > 0 {
                return Ok(None);
            }
        }

        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if len > MAX_FRAME_LEN {
            src.advance(4);
            let n = len.min(src.len());
            src.advance(n);
            self.discard = len - n;
            warn!(len, "discarding oversized native-messaging frame");
            return Ok(Some(Frame::Malformed {
                len,
                reason: format!("frame of {len} bytes exceeds the 1 MiB limit"),
            }));
        }

        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let body = src.split_to(len);
        match serde_json::from_slice::<Message>(&body) {
            Ok(message) => Ok(Some(Frame::Message(Box::new(message)))),
            Err(e) => {
                warn!(len, error = %e, "dropping frame with unparseable JSON body");
                Ok(Some(Frame::Malformed {
                    len,
                    reason: e.to_string(),
                }))
            }
        }
    }
}

impl Encoder<&Message> for NativeMessageCodec {
    type Error = CodecError;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let body = serde_json::to_vec(message)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge(body.len()));
        }
        // Header and body land in one reservation so the frame goes out in a
        // single write, never interleaved with another message.
        dst.reserve(4 + body.len());
        dst.put_u32_le(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

impl Encoder<Message> for NativeMessageCodec {
    type Error = CodecError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.encode(&message, dst)
    }
}
