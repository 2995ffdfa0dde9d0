//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration for the signal-desk client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote API location and document endpoints.
    pub api: ApiConfig,

    /// Live event stream settings.
    pub stream: StreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the dashboard API (e.g., "http://localhost:8000").
    pub base_url: String,

    /// Timeout for plain request/response calls in seconds.
    /// Not applied to the stream connection.
    pub request_timeout_secs: u64,

    /// Path of the fuser settings document.
    pub settings_path: String,

    /// Path of the event patterns document.
    pub event_patterns_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 10,
            settings_path: "/settings".to_string(),
            event_patterns_path: "/event-patterns".to_string(),
        }
    }
}

impl ApiConfig {
    /// Resolve an API path against `base_url`, keeping any path prefix the
    /// base carries.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}{}", self.base_url.trim_end_matches('/'), path))
    }
}

/// What the fallback poller does on each tick once the stream has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    /// Record a locally generated heartbeat.
    Heartbeat,
    /// Re-fetch `refetch_path` and record the body as a snapshot.
    Refetch,
}

/// Live stream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Path of the server-sent events endpoint.
    pub path: String,

    /// Fallback poll period in milliseconds.
    pub poll_interval_ms: u64,

    /// Number of records kept in the event buffer.
    pub buffer_capacity: usize,

    /// Fallback action once the stream degrades to polling.
    pub fallback: FallbackKind,

    /// Endpoint polled when `fallback = "refetch"`.
    pub refetch_path: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: "/ingest/stream".to_string(),
            poll_interval_ms: 3000,
            buffer_capacity: 200,
            fallback: FallbackKind::Heartbeat,
            refetch_path: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
