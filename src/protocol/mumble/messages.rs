//! Control-channel messages used by the bridge.
//!
//! Hand-encoded subset of the Mumble control protocol: only the messages
//! and fields the bridge touches are modeled, everything else is skipped
//! on decode. Field numbers follow the published Mumble.proto.

use bytes::{Buf, Bytes, BytesMut};

use crate::common::error::ProtocolError;
use crate::protocol::mumble::codec::Frame;
use crate::protocol::mumble::wire::{
    get_key, get_string, get_varint, put_bool_field, put_string_field, put_uint_field, skip_field,
    WIRE_LEN, WIRE_VARINT,
};

/// Control message type identifiers.
pub mod msg_type {
    pub const VERSION: u16 = 0;
    pub const AUTHENTICATE: u16 = 2;
    pub const PING: u16 = 3;
    pub const REJECT: u16 = 4;
    pub const SERVER_SYNC: u16 = 5;
    pub const CHANNEL_STATE: u16 = 7;
    pub const USER_REMOVE: u16 = 8;
    pub const USER_STATE: u16 = 9;
    pub const TEXT_MESSAGE: u16 = 11;
}

/// Client version advertisement, first message of the handshake.
#[derive(Debug, Clone)]
pub struct Version {
    pub version: u32,
    pub release: String,
    pub os: String,
    pub os_version: String,
}

impl Version {
    /// Protocol 1.4.0 encoded as major << 16 | minor << 8 | patch.
    pub fn current(release: &str) -> Self {
        Self {
            version: (1 << 16) | (4 << 8),
            release: release.to_string(),
            os: std::env::consts::OS.to_string(),
            os_version: String::new(),
        }
    }

    pub fn encode(&self) -> Frame {
        let mut buf = BytesMut::new();
        put_uint_field(&mut buf, 1, u64::from(self.version));
        put_string_field(&mut buf, 2, &self.release);
        put_string_field(&mut buf, 3, &self.os);
        put_string_field(&mut buf, 4, &self.os_version);
        Frame::new(msg_type::VERSION, buf.freeze())
    }
}

/// Authentication request: nickname, optional server password, tokens.
#[derive(Debug, Clone)]
pub struct Authenticate {
    pub username: String,
    pub password: String,
    pub tokens: Vec<String>,
}

impl Authenticate {
    pub fn encode(&self) -> Frame {
        let mut buf = BytesMut::new();
        put_string_field(&mut buf, 1, &self.username);
        if !self.password.is_empty() {
            put_string_field(&mut buf, 2, &self.password);
        }
        for token in &self.tokens {
            put_string_field(&mut buf, 3, token);
        }
        // Text-only client, but advertise opus so the server accepts us.
        put_bool_field(&mut buf, 5, true);
        Frame::new(msg_type::AUTHENTICATE, buf.freeze())
    }
}

/// Keepalive; the server drops clients silent for 30 seconds.
#[derive(Debug, Clone)]
pub struct Ping {
    pub timestamp: u64,
}

impl Ping {
    pub fn encode(&self) -> Frame {
        let mut buf = BytesMut::new();
        put_uint_field(&mut buf, 1, self.timestamp);
        Frame::new(msg_type::PING, buf.freeze())
    }
}

/// Server refused the connection during the handshake.
#[derive(Debug, Clone, Default)]
pub struct Reject {
    pub reason: String,
}

impl Reject {
    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        let mut msg = Self::default();
        while payload.has_remaining() {
            let (field, wire) = get_key(&mut payload)?;
            match (field, wire) {
                (2, WIRE_LEN) => msg.reason = get_string(&mut payload)?,
                _ => skip_field(&mut payload, wire)?,
            }
        }
        Ok(msg)
    }
}

/// Handshake completion; carries our session id.
#[derive(Debug, Clone, Default)]
pub struct ServerSync {
    pub session: Option<u32>,
    pub welcome_text: Option<String>,
}

impl ServerSync {
    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        let mut msg = Self::default();
        while payload.has_remaining() {
            let (field, wire) = get_key(&mut payload)?;
            match (field, wire) {
                (1, WIRE_VARINT) => msg.session = Some(get_varint(&mut payload)? as u32),
                (3, WIRE_LEN) => msg.welcome_text = Some(get_string(&mut payload)?),
                _ => skip_field(&mut payload, wire)?,
            }
        }
        Ok(msg)
    }
}

/// Channel tree announcement.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub channel_id: Option<u32>,
    pub name: Option<String>,
}

impl ChannelState {
    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        let mut msg = Self::default();
        while payload.has_remaining() {
            let (field, wire) = get_key(&mut payload)?;
            match (field, wire) {
                (1, WIRE_VARINT) => msg.channel_id = Some(get_varint(&mut payload)? as u32),
                (3, WIRE_LEN) => msg.name = Some(get_string(&mut payload)?),
                _ => skip_field(&mut payload, wire)?,
            }
        }
        Ok(msg)
    }
}

/// A user left the server.
#[derive(Debug, Clone, Default)]
pub struct UserRemove {
    pub session: Option<u32>,
}

impl UserRemove {
    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        let mut msg = Self::default();
        while payload.has_remaining() {
            let (field, wire) = get_key(&mut payload)?;
            match (field, wire) {
                (1, WIRE_VARINT) => msg.session = Some(get_varint(&mut payload)? as u32),
                _ => skip_field(&mut payload, wire)?,
            }
        }
        Ok(msg)
    }
}

/// User presence update. Decoded to track the session-to-nickname table;
/// encoded to move channels and to set our comment.
#[derive(Debug, Clone, Default)]
pub struct UserState {
    pub session: Option<u32>,
    pub name: Option<String>,
    pub channel_id: Option<u32>,
    pub comment: Option<String>,
}

impl UserState {
    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        let mut msg = Self::default();
        while payload.has_remaining() {
            let (field, wire) = get_key(&mut payload)?;
            match (field, wire) {
                (1, WIRE_VARINT) => msg.session = Some(get_varint(&mut payload)? as u32),
                (3, WIRE_LEN) => msg.name = Some(get_string(&mut payload)?),
                (5, WIRE_VARINT) => msg.channel_id = Some(get_varint(&mut payload)? as u32),
                (14, WIRE_LEN) => msg.comment = Some(get_string(&mut payload)?),
                _ => skip_field(&mut payload, wire)?,
            }
        }
        Ok(msg)
    }

    pub fn encode(&self) -> Frame {
        let mut buf = BytesMut::new();
        if let Some(session) = self.session {
            put_uint_field(&mut buf, 1, u64::from(session));
        }
        if let Some(name) = &self.name {
            put_string_field(&mut buf, 3, name);
        }
        if let Some(channel_id) = self.channel_id {
            put_uint_field(&mut buf, 5, u64::from(channel_id));
        }
        if let Some(comment) = &self.comment {
            put_string_field(&mut buf, 14, comment);
        }
        Frame::new(msg_type::USER_STATE, buf.freeze())
    }
}

/// A text message, in either direction.
#[derive(Debug, Clone, Default)]
pub struct TextMessage {
    /// Session of the sender (set by the server on inbound messages).
    pub actor: Option<u32>,
    /// Target channels (set by us on outbound messages).
    pub channel_id: Vec<u32>,
    pub message: String,
}

impl TextMessage {
    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        let mut msg = Self::default();
        while payload.has_remaining() {
            let (field, wire) = get_key(&mut payload)?;
            match (field, wire) {
                (1, WIRE_VARINT) => msg.actor = Some(get_varint(&mut payload)? as u32),
                (3, WIRE_VARINT) => msg.channel_id.push(get_varint(&mut payload)? as u32),
                (5, WIRE_LEN) => msg.message = get_string(&mut payload)?,
                _ => skip_field(&mut payload, wire)?,
            }
        }
        Ok(msg)
    }

    pub fn encode(&self) -> Frame {
        let mut buf = BytesMut::new();
        if let Some(actor) = self.actor {
            put_uint_field(&mut buf, 1, u64::from(actor));
        }
        for channel_id in &self.channel_id {
            put_uint_field(&mut buf, 3, u64::from(*channel_id));
        }
        put_string_field(&mut buf, 5, &self.message);
        Frame::new(msg_type::TEXT_MESSAGE, buf.freeze())
    }
}
