//! Protocol collaborators for the two remote networks.

pub mod irc;
pub mod mumble;
