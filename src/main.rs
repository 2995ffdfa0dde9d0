//! signal-desk live monitor.
//!
//! Follows the ingest event stream (falling back to polling when it fails),
//! checks the served config documents against the client rules once at
//! startup, and logs everything until interrupted.
//!
//! ```text
//!  SIGNAL_DESK_CONFIG ─▶ config ─▶ logging / metrics
//!                          │
//!          ┌───────────────┴────────────────┐
//!          ▼                                ▼
//!   live::LiveFeed                  sync::ConfigSyncController
//!   (SSE ─▶ buffer, or poller)      (/settings, /event-patterns)
//! ```

use std::path::PathBuf;

use signal_desk::config::{load_config, SyncConfig};
use signal_desk::live::LiveFeed;
use signal_desk::observability::{logging, metrics};
use signal_desk::sync::{ConfigSource, ConfigSyncController, LoadState};

const CONFIG_ENV: &str = "SIGNAL_DESK_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => load_config(&PathBuf::from(path))?,
        None => SyncConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("signal-desk v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        base_url = %config.api.base_url,
        stream_path = %config.stream.path,
        poll_interval_ms = config.stream.poll_interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let client = reqwest::Client::new();

    check_document(ConfigSyncController::fuser_settings(client.clone(), &config.api)?).await;
    check_document(ConfigSyncController::event_patterns(client.clone(), &config.api)?).await;

    let mut feed = LiveFeed::connect(client, &config.api, &config.stream)?;
    let mut states = feed.watch_state();

    loop {
        tokio::select! {
            record = feed.next() => match record {
                Some(record) => tracing::info!(
                    kind = %record.kind,
                    timestamp = %record.timestamp,
                    payload = %record.payload,
                    "Event"
                ),
                None => {
                    tracing::warn!("Feed ended");
                    break;
                }
            },
            Ok(()) = states.changed() => {
                tracing::info!(state = %*states.borrow_and_update(), "Connection state changed");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    tracing::info!(state = %feed.state(), "Closing feed");
    feed.dispose();
    tracing::info!(buffered = feed.buffer().len(), "Shutdown complete");
    Ok(())
}

async fn check_document<S: ConfigSource>(mut controller: ConfigSyncController<S>) {
    controller.load();
    controller.settle().await;

    let name = controller.rules().name().to_string();
    match controller.load_state() {
        LoadState::Loaded => {
            let result = controller.local_result();
            for (path, message) in result.errors() {
                tracing::warn!(document = %name, path, message, "Invalid field");
            }
            tracing::info!(document = %name, fields = result.len(), errors = result.error_count(), "Document checked");
        }
        LoadState::Failed(reason) => {
            tracing::warn!(document = %name, reason = %reason, "Document unavailable");
        }
        LoadState::Idle | LoadState::Loading => {}
    }
}
