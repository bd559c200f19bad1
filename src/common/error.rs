//! Error types for the application.

use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config file found at any of these paths: {candidates}")]
    NotFound { candidates: String },

    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Connection-related errors, raised while a session is being set up.
/// Once a session is established, errors no longer propagate; they are
/// converted into lifecycle events by the owning endpoint.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {host} failed: {message}")]
    TlsFailed { host: String, message: String },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Registration rejected: {reason}")]
    Rejected { reason: String },

    #[error("Connection timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol-related errors (framing and message grammar).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    #[error("Truncated field in message payload")]
    Truncated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
