use crate::event::RawRecord;
use crate::timestamp;
use chrono::SecondsFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("log file not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported log file format {ext:?}: {path}")]
    Unsupported { path: PathBuf, ext: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot tabulate {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("timed out after {after:?} reading {path}")]
    Timeout { path: PathBuf, after: Duration },
    #[error("reader task for {path} failed: {reason}")]
    Task { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// JSON array, single object, or newline-delimited JSON.
    Structured,
    /// CSV with a header row.
    Tabular,
    /// Free-text lines.
    Lines,
}

impl SourceFormat {
    pub fn sniff(path: &Path) -> Result<Self, IngestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(SourceFormat::Structured),
            "csv" => Ok(SourceFormat::Tabular),
            "log" | "txt" => Ok(SourceFormat::Lines),
            _ => Err(IngestError::Unsupported { path: path.to_path_buf(), ext }),
        }
    }
}

/// Records read from one file plus the count of malformed records skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutcome {
    pub records: Vec<RawRecord>,
    pub skipped: usize,
}

pub fn read_file(path: &Path) -> Result<ReadOutcome, IngestError> {
    let format = SourceFormat::sniff(path)?;
    if !path.exists() {
        return Err(IngestError::NotFound(path.to_path_buf()));
    }
    match format {
        SourceFormat::Structured => Ok(read_structured(&read_text(path)?, path)),
        SourceFormat::Tabular => {
            let f = std::fs::File::open(path)
                .map_err(|source| IngestError::Io { path: path.to_path_buf(), source })?;
            read_tabular(f, path)
        }
        SourceFormat::Lines => Ok(read_lines(&read_text(path)?)),
    }
}

fn read_text(path: &Path) -> Result<String, IngestError> {
    std::fs::read_to_string(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => IngestError::NotFound(path.to_path_buf()),
        _ => IngestError::Io { path: path.to_path_buf(), source },
    })
}

pub fn read_structured(text: &str, path: &Path) -> ReadOutcome {
    let mut out = ReadOutcome::default();
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => {
            for (idx, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(map) => out.records.push(map),
                    other => {
                        tracing::warn!(path = %path.display(), index = idx, "skipping non-object array element: {other}");
                        out.skipped += 1;
                    }
                }
            }
        }
        Ok(Value::Object(map)) => out.records.push(map),
        Ok(other) => {
            tracing::warn!(path = %path.display(), "skipping non-object JSON document: {other}");
            out.skipped += 1;
        }
        Err(_) => {
            // Not one document; fall back to one object per line.
            for (idx, line) in text.lines().enumerate() {
                if line.trim().is_empty() { continue; }
                match serde_json::from_str::<Value>(line) {
                    Ok(Value::Object(map)) => out.records.push(map),
                    Ok(_) => {
                        tracing::warn!(path = %path.display(), line = idx + 1, "skipping non-object JSON line");
                        out.skipped += 1;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), line = idx + 1, "invalid JSON line: {e}");
                        out.skipped += 1;
                    }
                }
            }
        }
    }
    out
}

/// Header row names the keys. A row of the wrong width fails the file.
pub fn read_tabular<R: Read>(reader: R, path: &Path) -> Result<ReadOutcome, IngestError> {
    let csv_err = |source: csv::Error| IngestError::Csv { path: path.to_path_buf(), source };
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers().map_err(csv_err)?.iter().map(|h| h.trim().to_string()).collect();
    let mut out = ReadOutcome::default();
    for row in rdr.records() {
        let row = row.map_err(csv_err)?;
        let mut rec = RawRecord::new();
        for (name, cell) in headers.iter().zip(row.iter()) {
            if let Some(v) = typed_cell(cell) {
                rec.insert(name.clone(), v);
            }
        }
        out.records.push(rec);
    }
    Ok(out)
}

fn typed_cell(cell: &str) -> Option<Value> {
    let t = cell.trim();
    if t.is_empty() { return None; }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    if let Ok(f) = t.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Some(Value::Number(n));
        }
    }
    Some(Value::String(t.to_string()))
}

pub const LEVEL_VOCABULARY: &[&str] = &["FATAL", "ERROR", "WARN", "WARNING", "INFO", "DEBUG", "TRACE"];

static LEVEL_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    LEVEL_VOCABULARY
        .iter()
        .map(|lvl| (*lvl, Regex::new(&format!(r"(?i)\b{lvl}\b")).unwrap()))
        .collect()
});

/// First vocabulary keyword found in the line, in vocabulary order.
pub fn extract_level(line: &str) -> Option<&'static str> {
    LEVEL_PATTERNS.iter().find(|(_, re)| re.is_match(line)).map(|(lvl, _)| *lvl)
}

pub fn read_lines(text: &str) -> ReadOutcome {
    let mut out = ReadOutcome::default();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() { continue; }
        let mut rec = RawRecord::new();
        rec.insert("message".into(), Value::String(line.to_string()));
        rec.insert("line_number".into(), Value::Number((idx as u64 + 1).into()));
        if let Some(ts) = timestamp::extract_from_text(line) {
            rec.insert("timestamp".into(), Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
        }
        if let Some(lvl) = extract_level(line) {
            rec.insert("level".into(), Value::String(lvl.to_string()));
        }
        out.records.push(rec);
    }
    out
}
