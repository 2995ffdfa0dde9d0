//! Metrics collection and exposition.
//!
//! # Metrics
//! - `live_stream_messages_total` (counter): messages delivered by the stream
//! - `live_connection_state` (gauge): 0=idle 1=connecting 2=open 3=erroring 4=polling 5=closed
//! - `live_poll_ticks_total` (counter): fallback invocations, by outcome
//! - `live_events_buffered` (gauge): current event buffer length
//! - `config_validation_errors` (gauge): errors in the last local pass, by document
//! - `config_saves_total` (counter): save attempts, by document and outcome

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::live::ConnectionState;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_stream_message() {
    metrics::counter!("live_stream_messages_total").increment(1);
}

pub fn record_connection_state(state: ConnectionState) {
    metrics::gauge!("live_connection_state").set(state as u8 as f64);
}

pub fn record_poll_tick(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("live_poll_ticks_total", "outcome" => outcome).increment(1);
}

pub fn record_buffer_len(len: usize) {
    metrics::gauge!("live_events_buffered").set(len as f64);
}

pub fn record_validation(document: &str, errors: usize) {
    metrics::gauge!("config_validation_errors", "document" => document.to_string()).set(errors as f64);
}

pub fn record_save(document: &str, outcome: &'static str) {
    metrics::counter!(
        "config_saves_total",
        "document" => document.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
