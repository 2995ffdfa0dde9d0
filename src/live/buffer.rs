//! Bounded, newest-first buffer of ingest events.

use std::collections::VecDeque;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default number of records retained by the feed.
pub const DEFAULT_CAPACITY: usize = 200;

/// One entry of the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: String,
    pub timestamp: String,
    pub payload: Value,
}

impl EventRecord {
    /// Build a record from a decoded stream payload.
    ///
    /// Kind comes from `type` or `event`, timestamp from `at` or `ts`.
    pub fn from_payload(payload: Value) -> Self {
        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| payload.get(*n).and_then(Value::as_str))
                .map(str::to_string)
        };
        let kind = field(&["type", "event"]).unwrap_or_else(|| "event".to_string());
        let timestamp = field(&["at", "ts"]).unwrap_or_default();
        Self { kind, timestamp, payload }
    }

    /// A locally generated liveness marker.
    pub fn heartbeat() -> Self {
        let at = now_rfc3339();
        Self {
            kind: "heartbeat".to_string(),
            timestamp: at.clone(),
            payload: json!({ "type": "heartbeat", "at": at }),
        }
    }

    /// A polled copy of some server resource.
    pub fn snapshot(payload: Value) -> Self {
        Self {
            kind: "snapshot".to_string(),
            timestamp: now_rfc3339(),
            payload,
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Ring buffer; inserting past capacity evicts the oldest record.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    records: VecDeque<EventRecord>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: EventRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    /// Records, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&EventRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
