//! Fixed-delay reconnection policy.
//!
//! Retries are unbounded: a remote endpoint that keeps failing is retried
//! forever at a constant per-endpoint delay. Losing an established session
//! and failing to establish one can carry different delays.

use std::time::Duration;

use crate::config::types::Config;
use crate::endpoint::EndpointKind;

/// Why a retry is being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    /// An established session dropped.
    Lost,
    /// A connection attempt never reached the established state.
    Failed,
}

/// Delays for one remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDelays {
    pub lost: Duration,
    pub failed: Duration,
}

impl RetryDelays {
    pub fn new(lost_secs: u64, failed_secs: u64) -> Self {
        Self {
            lost: Duration::from_secs(lost_secs),
            failed: Duration::from_secs(failed_secs),
        }
    }
}

/// Delay table for the two remote endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    mumble: RetryDelays,
    irc: RetryDelays,
}

impl RetryPolicy {
    pub fn new(mumble: RetryDelays, irc: RetryDelays) -> Self {
        Self { mumble, irc }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            mumble: RetryDelays::new(config.mumble.reconnect_delay, config.mumble.retry_delay),
            irc: RetryDelays::new(config.irc.reconnect_delay, config.irc.retry_delay),
        }
    }

    /// The delay before the next `start()`, or `None` for the console,
    /// which has no connection to retry.
    pub fn delay(&self, kind: EndpointKind, failure: LinkFailure) -> Option<Duration> {
        let delays = match kind {
            EndpointKind::Console => return None,
            EndpointKind::Mumble => self.mumble,
            EndpointKind::Irc => self.irc,
        };
        Some(match failure {
            LinkFailure::Lost => delays.lost,
            LinkFailure::Failed => delays.failed,
        })
    }
}

impl Default for RetryPolicy {
    /// The stock delays: Mumble reconnects faster after a drop, everything
    /// else waits 15 seconds.
    fn default() -> Self {
        Self {
            mumble: RetryDelays::new(5, 15),
            irc: RetryDelays::new(15, 15),
        }
    }
}

/// Counts consecutive failed attempts for one endpoint, for log lines.
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    /// Record one more failure; returns the new consecutive count.
    pub fn record(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.delay(EndpointKind::Mumble, LinkFailure::Lost),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            policy.delay(EndpointKind::Mumble, LinkFailure::Failed),
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            policy.delay(EndpointKind::Irc, LinkFailure::Lost),
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            policy.delay(EndpointKind::Irc, LinkFailure::Failed),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_console_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(EndpointKind::Console, LinkFailure::Lost), None);
        assert_eq!(policy.delay(EndpointKind::Console, LinkFailure::Failed), None);
    }

    #[test]
    fn test_from_config_overrides() {
        let config = crate::config::parser::load_config_str(
            r##"
            mumble {
                server = "voice.example.org"
                nickname = "bridge"
                channel = "Lobby"
                reconnect_delay = 2
                retry_delay = 30
            }
            irc {
                server = "irc.example.org"
                nickname = "bridge"
                channel = "#lobby"
            }
        "##,
        )
        .unwrap();

        let policy = RetryPolicy::from_config(&config);
        assert_eq!(
            policy.delay(EndpointKind::Mumble, LinkFailure::Lost),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            policy.delay(EndpointKind::Mumble, LinkFailure::Failed),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            policy.delay(EndpointKind::Irc, LinkFailure::Lost),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_retry_state_counts_and_resets() {
        let mut state = RetryState::default();
        assert_eq!(state.record(), 1);
        assert_eq!(state.record(), 2);
        state.reset();
        assert_eq!(state.record(), 1);
    }
}
