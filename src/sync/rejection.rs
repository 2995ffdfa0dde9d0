//! Classification of failed save responses.

use std::fmt;

use indexmap::IndexMap;
use reqwest::StatusCode;
use serde_json::Value;

/// Why the server refused a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveFailure {
    /// Field path → message, from `{"detail": {"validation_errors": {...}}}`.
    Validation(IndexMap<String, String>),
    /// Anything else.
    Generic(String),
}

impl SaveFailure {
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed = serde_json::from_str::<Value>(body).ok();

        if let Some(Value::Object(errors)) = parsed
            .as_ref()
            .and_then(|v| v.get("detail"))
            .and_then(|d| d.get("validation_errors"))
        {
            let mut out = IndexMap::new();
            for (key, value) in errors {
                flatten(key.clone(), value, &mut out);
            }
            if !out.is_empty() {
                return SaveFailure::Validation(out);
            }
        }

        let detail = parsed
            .as_ref()
            .and_then(|v| v.get("detail"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = match detail {
            Some(detail) => detail,
            None if !body.trim().is_empty() => body.trim().to_string(),
            None => format!("HTTP {}", status),
        };
        SaveFailure::Generic(message)
    }
}

impl fmt::Display for SaveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveFailure::Validation(errors) => {
                write!(f, "{} field(s) rejected", errors.len())
            }
            SaveFailure::Generic(message) => f.write_str(message),
        }
    }
}

fn flatten(path: String, value: &Value, out: &mut IndexMap<String, String>) {
    match value {
        Value::Null => {}
        Value::String(message) => {
            out.insert(path, message.clone());
        }
        Value::Object(map) => {
            for (key, child) in map {
                flatten(format!("{}.{}", path, key), child, out);
            }
        }
        Value::Array(items) if items.iter().all(|i| i.is_string() || i.is_null()) => {
            let messages: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if !messages.is_empty() {
                out.insert(path, messages.join("; "));
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten(format!("{}.{}", path, i), item, out);
            }
        }
        other => {
            out.insert(path, other.to_string());
        }
    }
}
