//! Message routing and attribution.
//!
//! A message received from one endpoint is relayed to every other
//! endpoint, attributed as `<sender@origin> text`. The destination order
//! is fixed (console first, then the remote endpoints in construction
//! order) so relay behavior is stable across runs. A message whose sender
//! matches the origin endpoint's own nickname is an echo of our own
//! traffic reflected back by that network and produces no relay at all.

use crate::endpoint::{EndpointKind, Identity};

/// A planned relay of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    /// The attributed line delivered to every destination.
    pub line: String,
    /// Destinations in delivery order; never contains the origin.
    pub destinations: Vec<EndpointKind>,
}

/// Routing rules over the three endpoint identities.
pub struct Router {
    /// Identities in destination order.
    endpoints: Vec<(EndpointKind, Identity)>,
}

impl Router {
    pub fn new(endpoints: Vec<(EndpointKind, Identity)>) -> Self {
        Self { endpoints }
    }

    /// Plan the relay of a message received from `origin`, or `None` when
    /// the message is a self-echo and must be dropped.
    pub fn route(&self, origin: EndpointKind, sender: &str, text: &str) -> Option<Relay> {
        let origin_identity = self.identity(origin)?;
        if sender == origin_identity.nick {
            return None;
        }

        let line = format!("<{}@{}> {}", sender, origin_identity.name, text);
        let destinations = self
            .endpoints
            .iter()
            .map(|(kind, _)| *kind)
            .filter(|kind| *kind != origin)
            .collect();

        Some(Relay { line, destinations })
    }

    fn identity(&self, kind: EndpointKind) -> Option<&Identity> {
        self.endpoints
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, identity)| identity)
    }
}
