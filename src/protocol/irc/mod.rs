//! IRC client protocol: line framing and message grammar.

pub mod codec;
pub mod message;

pub use codec::{new_irc_connection, IrcConnection};
pub use message::{numerics, Message};
