//! Dot-separated field paths.

use std::fmt;
use std::str::FromStr;

use crate::document::DocumentError;

/// Path into a [`ConfigDocument`](crate::document::ConfigDocument).
///
/// Segments are table keys or list indices: `weights.TAU`, `acquisition.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, DocumentError> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(DocumentError::InvalidPath(path.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The containing path, or `None` for a top-level key.
    pub fn parent(&self) -> Option<FieldPath> {
        match self.segments.len() {
            0 | 1 => None,
            n => Some(Self { segments: self.segments[..n - 1].to_vec() }),
        }
    }

    pub fn child(&self, segment: impl Into<String>) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// True if `self` equals `other` or lies underneath it.
    pub fn starts_with(&self, other: &FieldPath) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl FromStr for FieldPath {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<Vec<String>> for FieldPath {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}
