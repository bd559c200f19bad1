//! Ferryman - Mumble-IRC chat bridge bot
//!
//! Relays text messages between a Mumble channel, an IRC channel and the
//! local operator console, and mirrors each link's health into the other
//! network's presence text.

mod bridge;
mod common;
mod config;
mod console;
mod endpoint;
mod irc;
mod mumble;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bridge::{Bridge, RetryPolicy};
use common::event_channel;
use config::{load_and_validate, Config};
use console::ConsoleEndpoint;
use endpoint::Endpoint;
use irc::IrcEndpoint;
use mumble::MumbleEndpoint;

#[tokio::main]
async fn main() -> Result<()> {
    // A single optional argument names the config file; default paths are
    // probed otherwise.
    let config_arg = std::env::args().nth(1);
    let config = load_and_validate(config_arg.as_deref()).map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please ensure a config file exists and is properly formatted.");
        eprintln!("See ferryman.example.conf for reference.");
        e
    })?;

    init_logging(&config);

    info!("Ferryman v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "  Mumble: {}:{} channel '{}' as '{}'",
        config.mumble.server, config.mumble.port, config.mumble.channel, config.mumble.nickname
    );
    info!(
        "  IRC: {}:{} channel '{}' as '{}'",
        config.irc.server, config.irc.port, config.irc.channel, config.irc.nickname
    );

    let policy = RetryPolicy::from_config(&config);
    let (events_tx, events_rx) = event_channel();

    let console = Arc::new(ConsoleEndpoint::spawn(events_tx.clone()));
    let mumble = Arc::new(MumbleEndpoint::spawn(config.mumble.clone(), events_tx.clone()));
    let irc = Arc::new(IrcEndpoint::spawn(config.irc.clone(), events_tx));

    let bridge = Bridge::new(console.clone(), mumble.clone(), irc.clone(), policy);

    // Start the remote connections; they are self-sustaining through the
    // lifecycle events. The console then carries the foreground loop.
    bridge.start_links();

    tokio::select! {
        _ = bridge.run(events_rx) => info!("Bridge loop ended"),
        _ = shutdown_signal() => info!("Shutdown signal received"),
    }

    // Graceful teardown: QUIT to IRC, close the Mumble session.
    mumble.stop();
    irc.stop();
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("Exiting...");
    Ok(())
}

/// Base level from `RUST_LOG` (default info), plus per-endpoint levels
/// from the config file.
fn init_logging(config: &Config) {
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let directives = [
        ("ferryman::mumble", &config.mumble.loglevel),
        ("ferryman::protocol::mumble", &config.mumble.loglevel),
        ("ferryman::irc", &config.irc.loglevel),
        ("ferryman::protocol::irc", &config.irc.loglevel),
    ];
    for (target, level) in directives {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
