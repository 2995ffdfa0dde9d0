//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! live feed, poller, controllers produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Transport failures are only ever logged and counted, never returned
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
