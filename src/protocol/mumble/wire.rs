//! Minimal protobuf wire helpers for the control channel.
//!
//! The control messages the bridge speaks only use varint and
//! length-delimited fields, so this implements exactly that subset.
//! Unknown fields of any wire type are skipped on decode.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::error::ProtocolError;

pub const WIRE_VARINT: u8 = 0;
pub const WIRE_FIXED64: u8 = 1;
pub const WIRE_LEN: u8 = 2;
pub const WIRE_FIXED32: u8 = 5;

pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

pub fn get_varint(buf: &mut Bytes) -> Result<u64, ProtocolError> {
    let mut value: u64 = 0;
    for shift in (0..64).step_by(7) {
        if !buf.has_remaining() {
            return Err(ProtocolError::Truncated);
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProtocolError::InvalidMessage {
        message: "varint longer than 10 bytes".to_string(),
    })
}

fn put_key(buf: &mut BytesMut, field: u32, wire: u8) {
    put_varint(buf, (u64::from(field) << 3) | u64::from(wire));
}

/// Split a key into (field number, wire type).
pub fn get_key(buf: &mut Bytes) -> Result<(u32, u8), ProtocolError> {
    let key = get_varint(buf)?;
    Ok(((key >> 3) as u32, (key & 0x7) as u8))
}

pub fn put_uint_field(buf: &mut BytesMut, field: u32, value: u64) {
    put_key(buf, field, WIRE_VARINT);
    put_varint(buf, value);
}

pub fn put_bool_field(buf: &mut BytesMut, field: u32, value: bool) {
    put_uint_field(buf, field, u64::from(value));
}

pub fn put_string_field(buf: &mut BytesMut, field: u32, value: &str) {
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

/// Read a length-delimited field body.
pub fn get_len_field(buf: &mut Bytes) -> Result<Bytes, ProtocolError> {
    let len = get_varint(buf)? as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.split_to(len))
}

/// Read a length-delimited field as text (lossy; peers are not trusted to
/// send valid UTF-8).
pub fn get_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    let bytes = get_len_field(buf)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Skip over one field of the given wire type.
pub fn skip_field(buf: &mut Bytes, wire: u8) -> Result<(), ProtocolError> {
    match wire {
        WIRE_VARINT => {
            get_varint(buf)?;
        }
        WIRE_FIXED64 => {
            if buf.remaining() < 8 {
                return Err(ProtocolError::Truncated);
            }
            buf.advance(8);
        }
        WIRE_LEN => {
            get_len_field(buf)?;
        }
        WIRE_FIXED32 => {
            if buf.remaining() < 4 {
                return Err(ProtocolError::Truncated);
            }
            buf.advance(4);
        }
        other => {
            return Err(ProtocolError::InvalidMessage {
                message: format!("unsupported wire type {other}"),
            })
        }
    }
    Ok(())
}
