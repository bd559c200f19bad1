//! IRC side of the bridge.

pub mod client;

pub use client::IrcEndpoint;
