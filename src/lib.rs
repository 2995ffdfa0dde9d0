//! Live updates and config document sync for the signal desk dashboard.

pub mod config;
pub mod document;
pub mod live;
pub mod observability;
pub mod sync;
pub mod validation;

pub use config::schema::SyncConfig;
pub use document::{ConfigDocument, FieldPath, FieldValue};
pub use live::{ConnectionState, LiveFeed, StreamSubscription};
pub use sync::ConfigSyncController;
pub use validation::{validate, RuleSet, ValidationResult};
