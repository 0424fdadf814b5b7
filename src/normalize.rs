use crate::event::{Level, LogEvent, RawRecord, UNKNOWN_SERVICE};
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

// Candidate field names per canonical attribute, in priority order.
pub const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "@timestamp", "datetime", "date"];
pub const LEVEL_KEYS: &[&str] = &["level", "severity", "log_level", "priority"];
pub const SERVICE_KEYS: &[&str] = &["service", "component", "module", "app", "application"];
pub const MESSAGE_KEYS: &[&str] = &["message", "msg", "text", "description", "error"];

/// A record mapped onto the canonical schema whose timestamp may still be
/// missing. Only records with a timestamp become [`LogEvent`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Level,
    pub service: String,
    pub message: String,
    pub source: String,
    pub metadata: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    pub fn into_event(self) -> Option<LogEvent> {
        let timestamp = self.timestamp?;
        Some(LogEvent {
            timestamp,
            level: self.level,
            service: self.service,
            message: self.message,
            source: self.source,
            metadata: self.metadata,
        })
    }
}

/// Map a loosely-typed record onto the fixed schema.
///
/// For each canonical field the first candidate key holding a usable value
/// wins and is removed from the record; whatever is left becomes metadata.
/// A timestamp candidate that does not resolve is skipped and kept in
/// metadata. No timestamp is ever invented: an unresolved record carries
/// `None` and is dropped later by the timeline builder.
pub fn normalize(mut record: RawRecord, source: &str) -> NormalizedRecord {
    let dump = Value::Object(record.clone()).to_string();

    let mut ts = None;
    for key in TIMESTAMP_KEYS {
        let Some(v) = record.get(*key) else { continue };
        if v.is_null() { continue; }
        match timestamp::resolve_value(v) {
            Ok(t) => {
                ts = Some(t);
                record.remove(*key);
                break;
            }
            Err(e) => tracing::debug!(field = key, source, "timestamp candidate skipped: {e}"),
        }
    }

    let level = take_text(&mut record, LEVEL_KEYS)
        .map(|s| Level::parse(&s))
        .unwrap_or_default();
    let service = take_text(&mut record, SERVICE_KEYS).unwrap_or_else(|| UNKNOWN_SERVICE.to_string());
    let message = take_text(&mut record, MESSAGE_KEYS).unwrap_or(dump);

    NormalizedRecord {
        timestamp: ts,
        level,
        service,
        message,
        source: source.to_string(),
        metadata: record.into_iter().collect(),
    }
}

/// Convenience for callers that only want fully timed events.
pub fn normalize_event(record: RawRecord, source: &str) -> Option<LogEvent> {
    normalize(record, source).into_event()
}

fn take_text(record: &mut RawRecord, keys: &[&str]) -> Option<String> {
    for key in keys {
        let Some(text) = record.get(*key).and_then(value_text) else { continue };
        record.remove(*key);
        return Some(text);
    }
    None
}

/// Scalar rendering of a value; null and blank strings count as absent.
fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
