//! Client-side validation of configuration documents.
//!
//! # Data Flow
//! ```text
//! ConfigDocument + RuleSet (one per document shape)
//!     → engine.rs (walk every node, first matching rule decides)
//!     → ValidationResult (path → error | valid)
//! ```
//!
//! # Design Decisions
//! - Validation is a pure function, run on every edit and before every save
//! - Pattern syntax is checked with the `regex` crate; a server executing
//!   patterns with another engine may accept or reject different syntax

pub mod engine;
pub mod result;
pub mod rules;

pub use engine::{validate, validate_path};
pub use result::ValidationResult;
pub use rules::{FieldRule, PathSelector, RuleSet};
