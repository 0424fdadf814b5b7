use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("unparseable timestamp: {0}")]
    Unparseable(String),
    #[error("epoch value out of range: {0}")]
    OutOfRange(String),
}

/// A value of unknown shape that may hold a point in time.
#[derive(Debug, Clone, Copy)]
pub enum TimeInput<'a> {
    Native(DateTime<Utc>),
    /// Wall-clock value with no zone; read as UTC.
    Naive(NaiveDateTime),
    Epoch(f64),
    Text(&'a str),
    Json(&'a Value),
}

/// Zone-less date-time formats, tried in order after RFC 3339.
pub const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];

/// Offset-bearing formats (converted to UTC).
pub const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Slashed and dashed day/month variants. EU ordering precedes US ordering,
/// so an ambiguous `03/04/2024` is read as 3 April.
pub const DAY_MONTH_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M:%S",
];

/// Date-only formats, resolved to midnight UTC.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
];

pub fn resolve(input: TimeInput<'_>) -> Result<DateTime<Utc>, TimestampError> {
    match input {
        TimeInput::Native(dt) => Ok(dt),
        TimeInput::Naive(ndt) => Ok(Utc.from_utc_datetime(&ndt)),
        TimeInput::Epoch(secs) => resolve_epoch(secs),
        TimeInput::Text(s) => resolve_str(s),
        TimeInput::Json(v) => resolve_value(v),
    }
}

pub fn resolve_value(v: &Value) -> Result<DateTime<Utc>, TimestampError> {
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                resolve_epoch_int(i)
            } else if let Some(f) = n.as_f64() {
                resolve_epoch(f)
            } else {
                Err(TimestampError::Unparseable(n.to_string()))
            }
        }
        Value::String(s) => resolve_str(s),
        other => Err(TimestampError::Unparseable(other.to_string())),
    }
}

/// Integer epochs: seconds, or millis/micros when the magnitude says so.
pub fn resolve_epoch_int(n: i64) -> Result<DateTime<Utc>, TimestampError> {
    let mag = n.unsigned_abs();
    let dt = if mag >= 100_000_000_000_000 {
        DateTime::<Utc>::from_timestamp_micros(n)
    } else if mag >= 100_000_000_000 {
        DateTime::<Utc>::from_timestamp_millis(n)
    } else {
        DateTime::<Utc>::from_timestamp(n, 0)
    };
    dt.ok_or_else(|| TimestampError::OutOfRange(n.to_string()))
}

pub fn resolve_epoch(value: f64) -> Result<DateTime<Utc>, TimestampError> {
    if !value.is_finite() {
        return Err(TimestampError::OutOfRange(value.to_string()));
    }
    let secs = if value.abs() >= 1e14 {
        value / 1e6
    } else if value.abs() >= 1e11 {
        value / 1e3
    } else {
        value
    };
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return Err(TimestampError::OutOfRange(value.to_string()));
    }
    DateTime::<Utc>::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| TimestampError::OutOfRange(value.to_string()))
}

pub fn resolve_str(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(TimestampError::Unparseable(raw.to_string()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for f in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, f) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    for f in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, f) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for f in DAY_MONTH_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, f) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    for f in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, f) {
            if let Some(ndt) = d.and_hms_opt(0, 0, 0) {
                return Ok(Utc.from_utc_datetime(&ndt));
            }
        }
    }
    if let Some(dt) = parse_epoch_digits(s) {
        return Ok(dt);
    }
    Err(TimestampError::Unparseable(raw.to_string()))
}

fn parse_epoch_digits(s: &str) -> Option<DateTime<Utc>> {
    if !s.chars().all(|c| c.is_ascii_digit()) { return None; }
    let n = s.parse::<i64>().ok()?;
    match s.len() {
        10 => DateTime::<Utc>::from_timestamp(n, 0),
        13 => DateTime::<Utc>::from_timestamp_millis(n),
        16 => DateTime::<Utc>::from_timestamp_micros(n),
        _ => None,
    }
}

static RE_ISO_SPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})?").unwrap()
});
static RE_ISO_T: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})?").unwrap()
});
static RE_SLASHED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}").unwrap()
});
static RE_DASHED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{2}-\d{2}-\d{4} \d{2}:\d{2}:\d{2}").unwrap()
});

/// Find a timestamp embedded in a free-text line.
///
/// Searches four shapes in order (ISO with space, ISO with `T`, slashed
/// day/month, dashed day/month) and resolves the first one that parses. If
/// none do, the whole trimmed line is tried against the full format list.
pub fn extract_from_text(line: &str) -> Option<DateTime<Utc>> {
    let shapes: [&Lazy<Regex>; 4] = [&RE_ISO_SPACE, &RE_ISO_T, &RE_SLASHED, &RE_DASHED];
    for re in shapes {
        if let Some(m) = re.find(line) {
            if let Ok(dt) = resolve_str(m.as_str()) {
                return Some(dt);
            }
        }
    }
    resolve_str(line).ok()
}
