//! Config document synchronization.
//!
//! # Data Flow
//! ```text
//! ConfigSource (GET) → controller.rs (document, local validation)
//!     → edits (re-validate every time)
//!     → save (gated by local errors / in-flight / unaddressed rejection)
//!     → ConfigSource (PUT) → rejection.rs (structured vs generic failure)
//!     → controller.rs (overlay server errors onto the display)
//! ```
//!
//! # Design Decisions
//! - One save in flight at a time; extra requests are refused, not queued
//! - Server errors are authoritative only for the paths they name and clear
//!   as soon as that path (or an enclosing table/list) is edited
//! - Late results after a reload or dispose are dropped by generation

pub mod controller;
pub mod rejection;
pub mod source;

pub use controller::{ConfigSyncController, LoadState, Notice, SaveOutcome};
pub use rejection::SaveFailure;
pub use source::{ConfigSource, HttpConfigSource, SyncError};
