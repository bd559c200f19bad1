//! Bridge orchestrator that ties the three endpoints together.
//!
//! Owns the endpoint handles, consumes the event stream, applies the
//! routing rules and drives the reconnection policy for the two remote
//! endpoints. Handlers never block: a reconnection delay runs as a timer
//! task spawned on the failing endpoint's behalf, so one flapping link
//! never stalls relaying for the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bridge::retry::{LinkFailure, RetryPolicy, RetryState};
use crate::bridge::router::Router;
use crate::common::{EventStream, LinkEventKind};
use crate::endpoint::{Endpoint, EndpointKind};

/// The bridge: one console endpoint, two remote endpoints, and the rules
/// that connect them.
pub struct Bridge {
    console: Arc<dyn Endpoint>,
    mumble: Arc<dyn Endpoint>,
    irc: Arc<dyn Endpoint>,
    router: Router,
    policy: RetryPolicy,
    retries: HashMap<EndpointKind, RetryState>,
}

impl Bridge {
    /// Wire the three endpoints together. Relay delivery order is fixed:
    /// console first, then mumble, then irc.
    pub fn new(
        console: Arc<dyn Endpoint>,
        mumble: Arc<dyn Endpoint>,
        irc: Arc<dyn Endpoint>,
        policy: RetryPolicy,
    ) -> Self {
        let router = Router::new(vec![
            (EndpointKind::Console, console.identity().clone()),
            (EndpointKind::Mumble, mumble.identity().clone()),
            (EndpointKind::Irc, irc.identity().clone()),
        ]);
        let retries = [
            (EndpointKind::Mumble, RetryState::default()),
            (EndpointKind::Irc, RetryState::default()),
        ]
        .into_iter()
        .collect();

        Self {
            console,
            mumble,
            irc,
            router,
            policy,
            retries,
        }
    }

    /// Kick off the two remote connections. From here on they are
    /// self-sustaining through the lifecycle events.
    pub fn start_links(&self) {
        self.mumble.start();
        self.irc.start();
    }

    /// The dispatch loop; runs until the console closes.
    pub async fn run(mut self, mut events: EventStream) {
        while let Some(event) = events.recv().await {
            match event.kind {
                LinkEventKind::Message { sender, text } => {
                    self.on_message(event.origin, &sender, &text);
                }
                LinkEventKind::Established => self.on_established(event.origin),
                LinkEventKind::Lost => self.on_link_down(event.origin, LinkFailure::Lost),
                LinkEventKind::Failed => self.on_link_down(event.origin, LinkFailure::Failed),
                LinkEventKind::Closed => {
                    if event.origin == EndpointKind::Console {
                        info!("Console closed, shutting down");
                        break;
                    }
                    debug!("{} endpoint closed", event.origin);
                }
            }
        }
    }

    fn on_message(&self, origin: EndpointKind, sender: &str, text: &str) {
        let Some(relay) = self.router.route(origin, sender, text) else {
            debug!(%origin, %sender, "own message echoed back, dropping");
            return;
        };
        for destination in &relay.destinations {
            self.endpoint(*destination).send_text(&relay.line);
        }
    }

    fn on_established(&mut self, origin: EndpointKind) {
        info!("Connection to {} established", origin);
        if let Some(state) = self.retries.get_mut(&origin) {
            state.reset();
        }
        // Tell the other network's users the link is healthy again.
        if let Some(peer) = origin.peer() {
            self.endpoint(peer).set_presence(None);
        }
    }

    fn on_link_down(&mut self, origin: EndpointKind, failure: LinkFailure) {
        let Some(delay) = self.policy.delay(origin, failure) else {
            return;
        };
        let attempt = self
            .retries
            .get_mut(&origin)
            .map(RetryState::record)
            .unwrap_or(1);
        let line = status_line(origin, failure, delay);
        warn!(%origin, attempt, "{}", line);

        self.console.send_text(&line);
        if let Some(peer) = origin.peer() {
            self.endpoint(peer).set_presence(Some(&line));
        }

        // The retry runs on a timer task of its own; the dispatch loop
        // keeps serving the other endpoints meanwhile.
        let endpoint = Arc::clone(self.endpoint(origin));
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            endpoint.start();
        });
    }

    fn endpoint(&self, kind: EndpointKind) -> &Arc<dyn Endpoint> {
        match kind {
            EndpointKind::Console => &self.console,
            EndpointKind::Mumble => &self.mumble,
            EndpointKind::Irc => &self.irc,
        }
    }
}

fn status_line(origin: EndpointKind, failure: LinkFailure, delay: Duration) -> String {
    match failure {
        LinkFailure::Lost => format!(
            "connection to {} lost. reconnect in {} seconds.",
            origin,
            delay.as_secs()
        ),
        LinkFailure::Failed => format!(
            "connection to {} failed. retrying in {} seconds.",
            origin,
            delay.as_secs()
        ),
    }
}
