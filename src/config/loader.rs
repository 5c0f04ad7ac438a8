//! Configuration loading from disk.

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::health::policy::PolicyRegistry;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading and snapshot application.
///
/// All variants are fatal for the snapshot that produced them: the offending
/// configuration is rejected as a whole and no probing loop is started for it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("cluster '{cluster}': unparseable probe address '{address}'")]
    ProbeAddress { cluster: String, address: String },

    #[error("cluster '{cluster}': no probe timeout configured")]
    MissingProbeTimeout { cluster: String },
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path, registry: &PolicyRegistry) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config, registry).map_err(ConfigError::Validation)?;

    Ok(config)
}
