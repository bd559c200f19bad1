//! Configuration type definitions.

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mumble: MumbleConfig,
    pub irc: IrcConfig,
}

/// Mumble server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MumbleConfig {
    /// Server hostname or address.
    pub server: String,
    #[serde(default = "default_mumble_port")]
    pub port: u16,
    /// Nickname the bot connects as; also its self-echo handle.
    pub nickname: String,
    /// Channel to join after connecting.
    pub channel: String,
    /// Server password, if the server requires one.
    #[serde(default)]
    pub password: String,
    /// Access tokens forwarded in the authentication handshake.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Verify the server certificate. Mumble servers are commonly
    /// self-signed, so this defaults to off.
    #[serde(default)]
    pub tls_verify: bool,
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
    /// Seconds to wait before reconnecting after a lost connection.
    #[serde(default = "default_mumble_reconnect_delay")]
    pub reconnect_delay: u64,
    /// Seconds to wait before retrying after a failed connection attempt.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

/// IRC server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// Server hostname or address.
    pub server: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    /// Nickname the bot connects as; also its self-echo handle.
    pub nickname: String,
    /// Channel to join after registration.
    pub channel: String,
    /// Credential used according to `authtype`.
    #[serde(default)]
    pub password: String,
    /// Authentication mode: "none", "pass" (server password) or
    /// "nickserv" (IDENTIFY after registration).
    #[serde(default = "default_authtype")]
    pub authtype: String,
    /// Line encoding. Only UTF-8 is supported.
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
    /// Seconds to wait before reconnecting after a lost connection.
    #[serde(default = "default_irc_reconnect_delay")]
    pub reconnect_delay: u64,
    /// Seconds to wait before retrying after a failed connection attempt.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

/// IRC authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    Pass,
    NickServ,
}

impl AuthType {
    /// Parse the config string; `None` for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(AuthType::None),
            "pass" => Some(AuthType::Pass),
            "nickserv" => Some(AuthType::NickServ),
            _ => None,
        }
    }
}

impl IrcConfig {
    /// The validated authentication mode. Falls back to `None` for values
    /// that slipped past validation.
    pub fn auth_type(&self) -> AuthType {
        AuthType::from_str(&self.authtype).unwrap_or(AuthType::None)
    }
}

fn default_mumble_port() -> u16 {
    64738
}

fn default_irc_port() -> u16 {
    6667
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_authtype() -> String {
    "none".to_string()
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_mumble_reconnect_delay() -> u64 {
    5
}

fn default_irc_reconnect_delay() -> u64 {
    15
}

fn default_retry_delay() -> u64 {
    15
}
