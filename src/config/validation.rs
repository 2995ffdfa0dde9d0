//! Configuration validation.
//!
//! Serde handles the syntactic checks; this module checks value ranges and
//! that the configured URLs can be built. All errors are reported, not just
//! the first.

use thiserror::Error;
use url::Url;

use crate::config::schema::{FallbackKind, SyncConfig};

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("api.base_url is not a valid URL: {0}")]
    InvalidBaseUrl(String),

    #[error("{field} must start with '/'")]
    RelativePath { field: &'static str },

    #[error("{field} must be greater than 0")]
    Zero { field: &'static str },

    #[error("stream.refetch_path is required when stream.fallback = \"refetch\"")]
    MissingRefetchPath,
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<ConfigValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = Url::parse(&config.api.base_url) {
        errors.push(ConfigValidationError::InvalidBaseUrl(e.to_string()));
    }

    let paths = [
        ("api.settings_path", Some(&config.api.settings_path)),
        ("api.event_patterns_path", Some(&config.api.event_patterns_path)),
        ("stream.path", Some(&config.stream.path)),
        ("stream.refetch_path", config.stream.refetch_path.as_ref()),
    ];
    for (field, path) in paths {
        if let Some(path) = path {
            if !path.starts_with('/') {
                errors.push(ConfigValidationError::RelativePath { field });
            }
        }
    }

    if config.api.request_timeout_secs == 0 {
        errors.push(ConfigValidationError::Zero { field: "api.request_timeout_secs" });
    }
    if config.stream.poll_interval_ms == 0 {
        errors.push(ConfigValidationError::Zero { field: "stream.poll_interval_ms" });
    }
    if config.stream.buffer_capacity == 0 {
        errors.push(ConfigValidationError::Zero { field: "stream.buffer_capacity" });
    }

    if config.stream.fallback == FallbackKind::Refetch && config.stream.refetch_path.is_none() {
        errors.push(ConfigValidationError::MissingRefetchPath);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
