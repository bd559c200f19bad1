//! Configuration file loading (HOCON format).

use std::path::{Path, PathBuf};

use hocon::HoconLoader;

use crate::common::error::ConfigError;
use crate::config::env::{apply_env_overrides, config_path_override};
use crate::config::types::Config;
use crate::config::validate::validate_config;

/// Default locations probed when no path is given on the command line.
const DEFAULT_PATHS: &[&str] = &["ferryman.conf", "/etc/ferryman.conf"];

/// Resolve the config file path.
///
/// Precedence: explicit command-line argument, then the `FERRYMAN_CONFIG`
/// environment variable, then the default candidate paths. Fails with an
/// error naming every candidate when none exists.
pub fn find_config_file(explicit: Option<&str>) -> Result<PathBuf, ConfigError> {
    let override_path = config_path_override();
    let candidates: Vec<PathBuf> = match explicit.or(override_path.as_deref()) {
        Some(path) => vec![PathBuf::from(path)],
        None => DEFAULT_PATHS.iter().map(PathBuf::from).collect(),
    };

    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound {
            candidates: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Load configuration from a HOCON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    HoconLoader::new()
        .load_file(path)
        .map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Load configuration from a HOCON string.
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    HoconLoader::new()
        .load_str(content)
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Resolve, load, override and validate the configuration in one step.
pub fn load_and_validate(explicit: Option<&str>) -> Result<Config, ConfigError> {
    let path = find_config_file(explicit)?;
    let config = load_config(&path)?;
    let config = apply_env_overrides(config);
    validate_config(&config)?;
    Ok(config)
}
