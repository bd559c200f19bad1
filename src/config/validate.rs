//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::common::error::ConfigError;
use crate::config::types::{AuthType, Config};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Mumble section
    if config.mumble.server.is_empty() {
        errors.push("mumble.server is required".to_string());
    }
    if config.mumble.port == 0 {
        errors.push("mumble.port must be non-zero".to_string());
    }
    if config.mumble.nickname.is_empty() {
        errors.push("mumble.nickname is required".to_string());
    }
    if config.mumble.channel.is_empty() {
        errors.push("mumble.channel is required".to_string());
    }
    check_loglevel(&mut errors, "mumble", &config.mumble.loglevel);
    check_delay(&mut errors, "mumble.reconnect_delay", config.mumble.reconnect_delay);
    check_delay(&mut errors, "mumble.retry_delay", config.mumble.retry_delay);

    // IRC section
    if config.irc.server.is_empty() {
        errors.push("irc.server is required".to_string());
    }
    if config.irc.port == 0 {
        errors.push("irc.port must be non-zero".to_string());
    }
    if config.irc.nickname.is_empty() {
        errors.push("irc.nickname is required".to_string());
    }
    if config.irc.channel.is_empty() {
        errors.push("irc.channel is required".to_string());
    } else if !config.irc.channel.starts_with('#') && !config.irc.channel.starts_with('&') {
        errors.push(format!(
            "irc.channel '{}' must start with '#' or '&'",
            config.irc.channel
        ));
    }
    match AuthType::from_str(&config.irc.authtype) {
        None => errors.push(format!(
            "irc.authtype '{}' is invalid (use: none, pass, nickserv)",
            config.irc.authtype
        )),
        Some(AuthType::Pass) | Some(AuthType::NickServ) => {
            if config.irc.password.is_empty() {
                errors.push(format!(
                    "irc.password is required for authtype '{}'",
                    config.irc.authtype
                ));
            }
        }
        Some(AuthType::None) => {}
    }
    let encoding = config.irc.encoding.to_lowercase();
    if encoding != "utf-8" && encoding != "utf8" {
        errors.push(format!(
            "irc.encoding '{}' is not supported (only utf-8)",
            config.irc.encoding
        ));
    }
    check_loglevel(&mut errors, "irc", &config.irc.loglevel);
    check_delay(&mut errors, "irc.reconnect_delay", config.irc.reconnect_delay);
    check_delay(&mut errors, "irc.retry_delay", config.irc.retry_delay);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

fn check_loglevel(errors: &mut Vec<String>, section: &str, level: &str) {
    if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        errors.push(format!(
            "{}.loglevel '{}' is invalid (use: trace, debug, info, warn, error)",
            section, level
        ));
    }
}

fn check_delay(errors: &mut Vec<String>, key: &str, seconds: u64) {
    if seconds == 0 {
        errors.push(format!("{} must be at least 1 second", key));
    }
}
