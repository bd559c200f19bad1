//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `FERRYMAN_CONFIG` - config file path
//! - `FERRYMAN_MUMBLE_PASSWORD` - Mumble server password
//! - `FERRYMAN_IRC_PASSWORD` - IRC credential

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "FERRYMAN";

/// Apply environment variable overrides to a config.
///
/// This allows credentials to be provided via environment variables
/// instead of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(password) = env::var(format!("{}_MUMBLE_PASSWORD", ENV_PREFIX)) {
        config.mumble.password = password;
    }
    if let Ok(password) = env::var(format!("{}_IRC_PASSWORD", ENV_PREFIX)) {
        config.irc.password = password;
    }
    config
}

/// Config file path override from the environment, if set.
pub fn config_path_override() -> Option<String> {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::load_config_str;

    fn make_test_config() -> Config {
        load_config_str(
            r##"
            mumble {
                server = "voice.example.org"
                nickname = "bridge"
                channel = "Lobby"
            }
            irc {
                server = "irc.example.org"
                nickname = "bridge"
                channel = "#lobby"
                password = "from-file"
            }
        "##,
        )
        .unwrap()
    }

    #[test]
    fn test_no_overrides_leaves_config_unchanged() {
        env::remove_var("FERRYMAN_MUMBLE_PASSWORD");
        env::remove_var("FERRYMAN_IRC_PASSWORD");

        let config = apply_env_overrides(make_test_config());
        assert_eq!(config.mumble.password, "");
        assert_eq!(config.irc.password, "from-file");
    }

    #[test]
    fn test_config_path_override_unset() {
        env::remove_var("FERRYMAN_CONFIG");
        assert_eq!(config_path_override(), None);
    }
}
