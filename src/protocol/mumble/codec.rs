//! Control-channel framing.
//!
//! Every control message is a 6-byte header (message type u16, payload
//! length u32, both big-endian) followed by the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::common::error::ProtocolError;

const HEADER_LEN: usize = 6;
/// Per the protocol, payloads above 8 MiB are invalid.
const MAX_PAYLOAD: usize = 8 * 1024 * 1024;

/// A control-channel frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub msg_type: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(msg_type: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }
}

/// Codec for control-channel frames.
pub struct ControlCodec;

impl Decoder for ControlCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let msg_type = u16::from_be_bytes([src[0], src[1]]);
        let payload_len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if payload_len > MAX_PAYLOAD {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                limit: MAX_PAYLOAD,
            });
        }

        if src.len() < HEADER_LEN + payload_len {
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(payload_len).freeze();

        Ok(Some(Frame { msg_type, payload }))
    }
}

impl Encoder<Frame> for ControlCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(HEADER_LEN + item.payload.len());
        dst.put_u16(item.msg_type);
        dst.put_u32(item.payload.len() as u32);
        dst.put_slice(&item.payload);
        Ok(())
    }
}

/// A framed control-channel connection.
pub type ControlConnection<S> = Framed<S, ControlCodec>;

/// Create a new control-channel connection from a stream.
pub fn new_control_connection<S: AsyncRead + AsyncWrite>(stream: S) -> ControlConnection<S> {
    Framed::new(stream, ControlCodec)
}
