//! Mumble control-channel protocol: framing and message payloads.

pub mod codec;
pub mod messages;
pub mod wire;

pub use codec::{new_control_connection, ControlConnection, Frame};
