//! Per-field validation outcomes.

use indexmap::IndexMap;
use serde::Serialize;

/// Maps each evaluated field path to `None` (valid) or an error message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationResult {
    outcomes: IndexMap<String, Option<String>>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// A result holding only the given errors, e.g. a server's report.
    pub fn from_errors<I>(errors: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            outcomes: errors.into_iter().map(|(path, msg)| (path, Some(msg))).collect(),
        }
    }

    /// Record the outcome for `path`, replacing any earlier one.
    pub fn record(&mut self, path: impl Into<String>, outcome: Option<String>) {
        self.outcomes.insert(path.into(), outcome);
    }

    /// Mark each given path as failing with its message.
    pub fn overlay<'a, I>(&mut self, errors: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (path, message) in errors {
            self.outcomes.insert(path.clone(), Some(message.clone()));
        }
    }

    /// `Some(None)` for a valid path, `Some(Some(msg))` for a failing one,
    /// `None` when the path was never evaluated.
    pub fn outcome(&self, path: &str) -> Option<Option<&str>> {
        self.outcomes.get(path).map(Option::as_deref)
    }

    pub fn error(&self, path: &str) -> Option<&str> {
        self.outcome(path).flatten()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(path, outcome)| outcome.as_deref().map(|msg| (path.as_str(), msg)))
    }

    /// Errors as an owned map, in evaluation order.
    pub fn error_map(&self) -> IndexMap<String, String> {
        self.errors().map(|(p, m)| (p.to_string(), m.to_string())).collect()
    }

    pub fn invalid_paths(&self) -> Vec<String> {
        self.errors().map(|(path, _)| path.to_string()).collect()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_errors(&self) -> bool {
        self.outcomes.values().any(Option::is_some)
    }

    pub fn is_savable(&self) -> bool {
        !self.has_errors()
    }

    /// Number of evaluated paths, valid or not.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
