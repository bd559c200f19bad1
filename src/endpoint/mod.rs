//! The endpoint capability contract.
//!
//! Every bridged surface (Mumble channel, IRC channel, operator console)
//! exposes the same narrow set of operations to the bridge. The bridge
//! never reaches past this surface: protocol specifics stay inside the
//! concrete endpoint modules.
//!
//! All operations are fire-and-forget sends to the endpoint's own task,
//! which makes them non-blocking and safe to invoke from code running on
//! any endpoint's event path, including the endpoint's own.

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

/// Which of the three bridged surfaces an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Console,
    Mumble,
    Irc,
}

impl EndpointKind {
    /// The other remote endpoint, if any. Lifecycle handlers cross-post
    /// status text into the peer's presence field; the console has no peer.
    pub fn peer(self) -> Option<EndpointKind> {
        match self {
            EndpointKind::Console => None,
            EndpointKind::Mumble => Some(EndpointKind::Irc),
            EndpointKind::Irc => Some(EndpointKind::Mumble),
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointKind::Console => "console",
            EndpointKind::Mumble => "mumble",
            EndpointKind::Irc => "irc",
        };
        f.write_str(name)
    }
}

/// Immutable per-endpoint identity, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name used in relayed attributions and status lines.
    pub name: String,
    /// The endpoint's own handle on its network. Inbound messages carrying
    /// this handle as sender are echoes of our own traffic.
    pub nick: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nick: nick.into(),
        }
    }
}

/// Commands accepted by an endpoint's background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Attempt to (re)establish the connection.
    Connect,
    /// Gracefully tear the connection down.
    Disconnect,
    /// Deliver a text message to the endpoint's channel.
    Send(String),
    /// Update the externally visible presence text; `None` clears it.
    SetPresence(Option<String>),
}

/// Queue a command to an endpoint task, dropping it if the task is gone.
pub(crate) fn queue_command(commands: &mpsc::UnboundedSender<LinkCommand>, command: LinkCommand) {
    if commands.send(command).is_err() {
        trace!("endpoint task ended, dropping command");
    }
}

/// The uniform capability surface the bridge consumes.
pub trait Endpoint: Send + Sync {
    fn kind(&self) -> EndpointKind;

    fn identity(&self) -> &Identity;

    /// Begin establishing the connection. Non-blocking; calling it again
    /// after a failure attempts a fresh connection.
    fn start(&self);

    /// Request graceful disconnection. Safe to call from a handler running
    /// on this endpoint's own event path.
    fn stop(&self);

    /// Queue a text message for the endpoint's channel. Dropped silently
    /// while the endpoint is not connected.
    fn send_text(&self, text: &str);

    /// Update the endpoint's externally visible presence text (Mumble user
    /// comment, IRC away message). `None` clears a previously set notice.
    fn set_presence(&self, status: Option<&str>);
}
