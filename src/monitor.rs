use crate::config::Config;
use crate::ingest::{self, FileFailure};
use crate::trend::{self, LatencyAnomaly, TrendAlert};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Success,
    NoData,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub scan_number: u64,
    pub scan_time: DateTime<Utc>,
    pub events_processed: usize,
    pub alerts: Vec<TrendAlert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyAnomaly>,
    pub status: ScanStatus,
    pub failures: Vec<FileFailure>,
    pub warnings: usize,
    pub next_scan: DateTime<Utc>,
}

/// One independent scan: fresh ingest, fresh timeline, fresh alerts.
pub async fn scan_once(sources: &[PathBuf], cfg: &Config, scan_number: u64) -> ScanResult {
    let scan_time = Utc::now();
    let next_scan = scan_time
        + chrono::Duration::from_std(Duration::from_secs(cfg.monitor.interval_secs)).unwrap_or_else(|_| chrono::Duration::zero());
    let report = ingest::load_files_bounded(sources, &cfg.ingest).await;
    let warnings = report.warning_count();
    if report.timeline.is_empty() {
        return ScanResult {
            scan_number,
            scan_time,
            events_processed: 0,
            alerts: Vec::new(),
            latency: None,
            status: ScanStatus::NoData,
            failures: report.failures,
            warnings,
            next_scan,
        };
    }
    let alerts = trend::detect(&report.timeline, &cfg.trend);
    let latency = trend::find_latency_anomaly(&report.timeline, &cfg.trend);
    for a in &alerts {
        tracing::warn!(kind = ?a.kind, severity = ?a.severity, confidence = a.confidence, "proactive alert: {}", a.description);
    }
    ScanResult {
        scan_number,
        scan_time,
        events_processed: report.timeline.len(),
        alerts,
        latency,
        status: ScanStatus::Success,
        failures: report.failures,
        warnings,
        next_scan,
    }
}

/// Polling monitor. Runs a scan every `monitor.interval_secs` until the
/// shutdown channel flips to `true` or its sender goes away.
///
/// A source that hangs past the per-file timeout parks one blocking thread
/// per scan; see [`ingest::load_files_bounded`].
pub struct Sentinel {
    sources: Vec<PathBuf>,
    config: Config,
    shutdown: watch::Receiver<bool>,
}

impl Sentinel {
    pub fn new(sources: Vec<PathBuf>, config: Config, shutdown: watch::Receiver<bool>) -> Self {
        Self { sources, config, shutdown }
    }

    /// Returns the number of completed scans.
    pub async fn run<F>(mut self, mut on_scan: F) -> u64
    where
        F: FnMut(&ScanResult),
    {
        tracing::info!(
            "sentinel monitoring {} sources every {}s",
            self.sources.len(),
            self.config.monitor.interval_secs
        );
        let mut interval = time::interval(Duration::from_secs(self.config.monitor.interval_secs));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        let mut scans = 0u64;

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    scans += 1;
                    let result = scan_once(&self.sources, &self.config, scans).await;
                    tracing::debug!(scan = scans, events = result.events_processed, alerts = result.alerts.len(), "scan complete");
                    on_scan(&result);
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("sentinel stopped after {scans} scans");
        scans
    }
}
