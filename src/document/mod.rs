//! Editable configuration documents.
//!
//! A document is an ordered nesting of named tables whose leaves are numbers
//! or strings, with lists for pattern sets. Key order is preserved so a
//! document round-trips to the server in the order it was served.
//!
//! Table keys must be addressable by a [`FieldPath`], so keys that are empty
//! or contain `.` are rejected on load and on edit.

pub mod path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use path::FieldPath;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("invalid field path '{0}'")]
    InvalidPath(String),

    #[error("no field at '{0}'")]
    NotFound(String),

    #[error("'{0}' is not a table or list")]
    NotAContainer(String),

    #[error("index out of range at '{path}' (length {len})")]
    IndexOutOfRange { path: String, len: usize },

    #[error("field '{0}' already exists")]
    AlreadyExists(String),

    #[error("no document loaded")]
    NotLoaded,

    #[error("table key '{0}' is not addressable (empty or contains '.')")]
    InvalidKey(String),
}

/// A value in a document.
///
/// `Number` holds any `f64`, including non-finite values typed in by a user;
/// those serialize as `null` and never pass validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
    Table(IndexMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn child(&self, segment: &str) -> Option<&FieldValue> {
        match self {
            FieldValue::Table(map) => map.get(segment),
            FieldValue::List(items) => match segment.parse::<usize>() {
                Ok(i) => items.get(i),
                Err(_) => None,
            },
            _ => None,
        }
    }

    fn child_mut(&mut self, segment: &str) -> Option<&mut FieldValue> {
        match self {
            FieldValue::Table(map) => map.get_mut(segment),
            FieldValue::List(items) => match segment.parse::<usize>() {
                Ok(i) => items.get_mut(i),
                Err(_) => None,
            },
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        FieldValue::List(items.into_iter().map(Into::into).collect())
    }
}

enum Container<'a> {
    Table(&'a mut IndexMap<String, FieldValue>),
    List(&'a mut Vec<FieldValue>),
}

/// A structured, user-editable configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigDocument {
    root: IndexMap<String, FieldValue>,
}

impl<'de> Deserialize<'de> for ConfigDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let root = IndexMap::<String, FieldValue>::deserialize(deserializer)?;
        check_table(&root).map_err(serde::de::Error::custom)?;
        Ok(Self { root })
    }
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn get(&self, path: &FieldPath) -> Option<&FieldValue> {
        let (first, rest) = path.segments().split_first()?;
        rest.iter()
            .try_fold(self.root.get(first)?, |node, segment| node.child(segment))
    }

    /// Replace the value at `path`, or add it when the containing table lacks
    /// the key. Returns the previous value.
    pub fn set(&mut self, path: &FieldPath, value: FieldValue) -> Result<Option<FieldValue>, DocumentError> {
        check_value(&value)?;
        let (container, last) = self.parent_mut(path)?;
        match container {
            Container::Table(map) => Ok(map.insert(last.to_string(), value)),
            Container::List(items) => {
                let len = items.len();
                let index = list_index(path, last)?;
                let slot = items.get_mut(index).ok_or_else(|| out_of_range(path, len))?;
                Ok(Some(std::mem::replace(slot, value)))
            }
        }
    }

    /// Add a new table entry, or insert into a list at the given index
    /// (an index equal to the length appends).
    pub fn insert(&mut self, path: &FieldPath, value: FieldValue) -> Result<(), DocumentError> {
        check_value(&value)?;
        let (container, last) = self.parent_mut(path)?;
        match container {
            Container::Table(map) => {
                if map.contains_key(last) {
                    return Err(DocumentError::AlreadyExists(path.to_string()));
                }
                map.insert(last.to_string(), value);
            }
            Container::List(items) => {
                let index = list_index(path, last)?;
                if index > items.len() {
                    return Err(out_of_range(path, items.len()));
                }
                items.insert(index, value);
            }
        }
        Ok(())
    }

    /// Remove the value at `path`. Table order and later list elements are
    /// preserved (list elements shift down).
    pub fn remove(&mut self, path: &FieldPath) -> Result<FieldValue, DocumentError> {
        let (container, last) = self.parent_mut(path)?;
        match container {
            Container::Table(map) => map
                .shift_remove(last)
                .ok_or_else(|| DocumentError::NotFound(path.to_string())),
            Container::List(items) => {
                let len = items.len();
                let index = list_index(path, last)?;
                if index >= len {
                    return Err(out_of_range(path, len));
                }
                Ok(items.remove(index))
            }
        }
    }

    /// Every node below the root in document order, parents before children.
    pub fn nodes(&self) -> Vec<(FieldPath, &FieldValue)> {
        let mut out = Vec::new();
        for (key, value) in &self.root {
            collect(FieldPath::from(vec![key.clone()]), value, &mut out);
        }
        out
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    fn parent_mut<'a, 'p>(&'a mut self, path: &'p FieldPath) -> Result<(Container<'a>, &'p str), DocumentError> {
        let (last, parents) = path
            .segments()
            .split_last()
            .ok_or_else(|| DocumentError::InvalidPath(path.to_string()))?;
        let last = last.as_str();

        let Some((first, rest)) = parents.split_first() else {
            return Ok((Container::Table(&mut self.root), last));
        };

        let not_found = || DocumentError::NotFound(path.to_string());
        let mut node = self.root.get_mut(first).ok_or_else(not_found)?;
        for segment in rest {
            node = node.child_mut(segment).ok_or_else(not_found)?;
        }

        match node {
            FieldValue::Table(map) => Ok((Container::Table(map), last)),
            FieldValue::List(items) => Ok((Container::List(items), last)),
            _ => Err(DocumentError::NotAContainer(FieldPath::from(parents.to_vec()).to_string())),
        }
    }
}

fn collect<'a>(path: FieldPath, value: &'a FieldValue, out: &mut Vec<(FieldPath, &'a FieldValue)>) {
    match value {
        FieldValue::Table(map) => {
            out.push((path.clone(), value));
            for (key, child) in map {
                collect(path.child(key.clone()), child, out);
            }
        }
        FieldValue::List(items) => {
            out.push((path.clone(), value));
            for (i, child) in items.iter().enumerate() {
                collect(path.child(i.to_string()), child, out);
            }
        }
        _ => out.push((path, value)),
    }
}

fn check_table(map: &IndexMap<String, FieldValue>) -> Result<(), DocumentError> {
    for (key, value) in map {
        if key.is_empty() || key.contains('.') {
            return Err(DocumentError::InvalidKey(key.clone()));
        }
        check_value(value)?;
    }
    Ok(())
}

fn check_value(value: &FieldValue) -> Result<(), DocumentError> {
    match value {
        FieldValue::Table(map) => check_table(map),
        FieldValue::List(items) => items.iter().try_for_each(check_value),
        _ => Ok(()),
    }
}

fn list_index(path: &FieldPath, segment: &str) -> Result<usize, DocumentError> {
    segment
        .parse::<usize>()
        .map_err(|_| DocumentError::InvalidPath(path.to_string()))
}

fn out_of_range(path: &FieldPath, len: usize) -> DocumentError {
    DocumentError::IndexOutOfRange { path: path.to_string(), len }
}
