use crate::config::IngestConfig;
use crate::normalize::{self, NormalizedRecord};
use crate::reader;
use crate::timeline::Timeline;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

pub use crate::reader::IngestError;

/// Normalized records from one file, in file order.
#[derive(Debug, Clone, Default)]
pub struct FileBatch {
    pub records: Vec<NormalizedRecord>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// Result of ingesting a batch of files. Partial success is visible through
/// `failures`, `skipped_records` and `dropped_untimed`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub timeline: Timeline,
    pub files_read: usize,
    pub failures: Vec<FileFailure>,
    pub skipped_records: usize,
    pub dropped_untimed: usize,
}

impl IngestReport {
    pub fn warning_count(&self) -> usize {
        self.failures.len() + self.skipped_records + self.dropped_untimed
    }

    pub fn is_partial(&self) -> bool {
        self.warning_count() > 0
    }
}

/// Read and normalize a single file.
pub fn load_file(path: &Path) -> Result<FileBatch, IngestError> {
    let outcome = reader::read_file(path)?;
    let source = path.display().to_string();
    let records = outcome
        .records
        .into_par_iter()
        .map(|r| normalize::normalize(r, &source))
        .collect();
    Ok(FileBatch { records, skipped: outcome.skipped })
}

/// Merge per-file results in input order. A failed file contributes nothing.
pub fn assemble(paths: &[PathBuf], results: Vec<Result<FileBatch, IngestError>>) -> IngestReport {
    let mut report = IngestReport::default();
    let mut all = Vec::new();
    for (path, res) in paths.iter().zip(results) {
        match res {
            Ok(batch) => {
                tracing::info!("parsed {} records from {}", batch.records.len(), path.display());
                report.files_read += 1;
                report.skipped_records += batch.skipped;
                all.extend(batch.records);
            }
            Err(e) => {
                tracing::error!("failed to parse {}: {e}", path.display());
                report.failures.push(FileFailure { path: path.display().to_string(), reason: e.to_string() });
            }
        }
    }
    let (timeline, dropped) = Timeline::build(all);
    if dropped > 0 {
        tracing::warn!("dropped {dropped} records with unresolvable timestamps");
    }
    if timeline.is_empty() {
        tracing::warn!("no valid log events parsed from any file");
    } else {
        tracing::info!("consolidated timeline built with {} events", timeline.len());
    }
    report.timeline = timeline;
    report.dropped_untimed = dropped;
    report
}

/// Sequential ingest without a time bound.
pub fn load_files(paths: &[PathBuf]) -> IngestReport {
    let results = paths.iter().map(|p| load_file(p)).collect();
    assemble(paths, results)
}

/// Concurrent ingest, one blocking task per file, each bounded by the
/// configured per-file timeout. A file that overruns is reported as failed.
/// Output order depends only on `paths`.
///
/// Blocking tasks cannot be cancelled: an overrunning reader keeps its
/// blocking-pool thread until the read returns and is never joined. Callers
/// that own the runtime should shut it down with
/// `Runtime::shutdown_timeout` or `shutdown_background`, since a plain drop
/// waits for such readers indefinitely.
pub async fn load_files_bounded(paths: &[PathBuf], cfg: &IngestConfig) -> IngestReport {
    let limit = cfg.file_timeout();
    let started = Instant::now();
    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .map(|p| tokio::task::spawn_blocking(move || load_file(&p)))
        .collect();

    let mut results = Vec::with_capacity(paths.len());
    for (path, handle) in paths.iter().zip(handles) {
        let res = match tokio::time::timeout_at(started + limit, handle).await {
            Ok(Ok(res)) => res,
            Ok(Err(join)) => Err(IngestError::Task { path: path.clone(), reason: join.to_string() }),
            Err(_) => Err(IngestError::Timeout { path: path.clone(), after: limit }),
        };
        results.push(res);
    }
    assemble(paths, results)
}
