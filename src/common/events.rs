//! Bridge event stream.
//!
//! Endpoints publish what happens to them into a single-subscriber event
//! stream owned by the bridge. Each endpoint emits from exactly one task,
//! so events arrive at most once per occurrence and in occurrence order
//! per endpoint. No ordering is guaranteed across endpoints.

use tokio::sync::mpsc;

use crate::endpoint::EndpointKind;

/// An event raised by an endpoint, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub origin: EndpointKind,
    pub kind: LinkEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEventKind {
    /// A text message arrived on the endpoint's channel.
    Message { sender: String, text: String },
    /// The connection reached its steady state.
    Established,
    /// A previously established session dropped unexpectedly.
    Lost,
    /// A connection attempt never reached the established state.
    Failed,
    /// The endpoint will emit no further events (console EOF or `stop()`).
    Closed,
}

impl LinkEvent {
    pub fn message(origin: EndpointKind, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin,
            kind: LinkEventKind::Message {
                sender: sender.into(),
                text: text.into(),
            },
        }
    }

    pub fn established(origin: EndpointKind) -> Self {
        Self {
            origin,
            kind: LinkEventKind::Established,
        }
    }

    pub fn lost(origin: EndpointKind) -> Self {
        Self {
            origin,
            kind: LinkEventKind::Lost,
        }
    }

    pub fn failed(origin: EndpointKind) -> Self {
        Self {
            origin,
            kind: LinkEventKind::Failed,
        }
    }

    pub fn closed(origin: EndpointKind) -> Self {
        Self {
            origin,
            kind: LinkEventKind::Closed,
        }
    }
}

/// Sending half of the bridge event stream, cloned into every endpoint.
pub type EventSink = mpsc::UnboundedSender<LinkEvent>;

/// Receiving half, consumed by the bridge dispatch loop.
pub type EventStream = mpsc::UnboundedReceiver<LinkEvent>;

/// Create the event stream wiring endpoints to the bridge.
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}
