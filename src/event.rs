use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const UNKNOWN_SERVICE: &str = "unknown";

/// Loosely-typed record as produced by a reader.
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    /// Unrecognized level, kept uppercased.
    Other(String),
}

impl Level {
    pub fn parse(raw: &str) -> Level {
        let up = raw.trim().to_uppercase();
        match up.as_str() {
            "DEBUG" => Level::Debug,
            "INFO" => Level::Info,
            "WARN" | "WARNING" => Level::Warn,
            "ERROR" => Level::Error,
            "FATAL" => Level::Fatal,
            _ => Level::Other(up),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
            Level::Other(s) => s.as_str(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Level::Error)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Level::parse(&raw))
    }
}

/// One normalized log event. Inside a timeline the timestamp is always
/// resolved and the message is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub service: String,
    pub message: String,
    pub source: String,
    pub metadata: BTreeMap<String, Value>,
}

impl LogEvent {
    /// Render back into a raw record using the canonical field names.
    /// `source` is not included; it travels alongside the record.
    pub fn to_record(&self) -> RawRecord {
        let mut rec = RawRecord::new();
        for (k, v) in &self.metadata {
            rec.insert(k.clone(), v.clone());
        }
        rec.insert(
            "timestamp".into(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        rec.insert("level".into(), Value::String(self.level.as_str().to_string()));
        rec.insert("service".into(), Value::String(self.service.clone()));
        rec.insert("message".into(), Value::String(self.message.clone()));
        rec
    }

    /// File name component of `source`, or the whole source when it has none.
    pub fn source_name(&self) -> &str {
        std::path::Path::new(&self.source)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.source)
    }
}
