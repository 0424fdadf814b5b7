use crate::config::TrendConfig;
use crate::event::LogEvent;
use crate::timeline::Timeline;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendKind {
    IncreasingErrors,
    RisingLatency,
    ConnectionPoolExhaustion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAlert {
    pub kind: TrendKind,
    pub severity: Severity,
    pub description: String,
    pub current_value: f64,
    pub baseline_value: f64,
    pub confidence: f64,
    pub window_minutes: i64,
    pub affected_services: Vec<String>,
    pub recommended_actions: Vec<String>,
}

/// Recurring latency breaches inside the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyAnomaly {
    pub count: usize,
    pub mean_latency_ms: f64,
    pub max_latency_ms: f64,
    pub threshold_ms: f64,
    pub window_minutes: i64,
    pub services: Vec<String>,
}

impl LatencyAnomaly {
    pub fn description(&self) -> String {
        format!(
            "Detected {} high-latency events in the last {} minutes, with an average latency of {:.0}ms.",
            self.count, self.window_minutes, self.mean_latency_ms
        )
    }
}

/// Run every check against one timeline snapshot. Stateless: the result
/// depends only on the arguments.
pub fn detect(timeline: &Timeline, cfg: &TrendConfig) -> Vec<TrendAlert> {
    if timeline.is_empty() {
        return Vec::new();
    }
    let mut alerts = Vec::new();
    alerts.extend(check_error_rate(timeline, cfg));
    alerts.extend(check_latency(timeline, cfg));
    alerts.extend(check_pool_exhaustion(timeline, cfg));
    alerts
}

/// Fraction of events at ERROR level. `None` for an empty slice.
pub fn error_ratio(events: &[LogEvent]) -> Option<f64> {
    if events.is_empty() {
        return None;
    }
    let errors = events.iter().filter(|e| e.level.is_error()).count();
    Some(errors as f64 / events.len() as f64)
}

pub fn check_error_rate(timeline: &Timeline, cfg: &TrendConfig) -> Option<TrendAlert> {
    let (events, window_minutes) = match cfg.error_window_minutes {
        Some(m) => (timeline.recent_minutes(m), m),
        None => {
            let span = match (timeline.first_timestamp(), timeline.last_timestamp()) {
                (Some(a), Some(b)) => (b - a).num_minutes(),
                _ => 0,
            };
            (timeline.events(), span)
        }
    };
    let ratio = error_ratio(events)?;
    // strictly above: a ratio sitting exactly on the threshold does not fire
    if ratio <= cfg.error_rate_threshold {
        return None;
    }
    let severity = if ratio > cfg.error_rate_high_threshold { Severity::High } else { Severity::Medium };
    let services = services_by_count(events.iter().filter(|e| e.level.is_error()));
    let top = lead_service(&services);
    Some(TrendAlert {
        kind: TrendKind::IncreasingErrors,
        severity,
        description: format!(
            "Detected a high error rate ({:.0}%) across {} events.",
            ratio * 100.0,
            events.len()
        ),
        current_value: ratio,
        baseline_value: cfg.baseline_error_rate,
        confidence: cfg.error_confidence,
        window_minutes,
        recommended_actions: vec![
            format!("Investigate error patterns in {top}"),
            "Check database connection health".to_string(),
            "Review recent deployments and configuration changes".to_string(),
        ],
        affected_services: services,
    })
}

static RE_LATENCY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s?ms\b").unwrap());

/// First `<number>ms` token in a message.
pub fn extract_latency_ms(message: &str) -> Option<f64> {
    RE_LATENCY
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn latency_scope(timeline: &Timeline, cfg: &TrendConfig) -> Timeline {
    match cfg.latency_source.as_deref() {
        Some(src) => timeline.from_source(src),
        None => timeline.clone(),
    }
}

/// Latency breaches within the trailing window, measured back from the
/// latest event of the considered source. Needs at least
/// `min_latency_events` breaches: a single spike is noise.
pub fn find_latency_anomaly(timeline: &Timeline, cfg: &TrendConfig) -> Option<LatencyAnomaly> {
    let scoped = latency_scope(timeline, cfg);
    let window = scoped.recent_minutes(cfg.latency_window_minutes);
    let offenders: Vec<(&LogEvent, f64)> = window
        .iter()
        .filter_map(|e| extract_latency_ms(&e.message).map(|ms| (e, ms)))
        .filter(|(_, ms)| *ms > cfg.latency_threshold_ms)
        .collect();
    if offenders.is_empty() || offenders.len() < cfg.min_latency_events {
        return None;
    }
    let count = offenders.len();
    let mean = offenders.iter().map(|(_, ms)| ms).sum::<f64>() / count as f64;
    let max = offenders.iter().map(|(_, ms)| *ms).fold(f64::MIN, f64::max);
    Some(LatencyAnomaly {
        count,
        mean_latency_ms: mean,
        max_latency_ms: max,
        threshold_ms: cfg.latency_threshold_ms,
        window_minutes: cfg.latency_window_minutes,
        services: services_by_count(offenders.iter().map(|(e, _)| *e)),
    })
}

pub fn check_latency(timeline: &Timeline, cfg: &TrendConfig) -> Option<TrendAlert> {
    let anomaly = find_latency_anomaly(timeline, cfg)?;
    let severity = if anomaly.mean_latency_ms > 2.0 * cfg.latency_threshold_ms {
        Severity::High
    } else {
        Severity::Medium
    };
    let top = lead_service(&anomaly.services);
    Some(TrendAlert {
        kind: TrendKind::RisingLatency,
        severity,
        description: anomaly.description(),
        current_value: anomaly.mean_latency_ms,
        baseline_value: cfg.latency_threshold_ms,
        confidence: cfg.latency_confidence,
        window_minutes: anomaly.window_minutes,
        recommended_actions: vec![
            format!("Inspect slow queries and lock contention on {top}"),
            "Check connection pool utilisation".to_string(),
            format!("Consider scaling {top} before latency turns into timeouts"),
        ],
        affected_services: anomaly.services,
    })
}

static RE_POOL_EXHAUSTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bpool\b.*\bexhaust|\bexhaust\w*\b.*\bpool\b").unwrap()
});

pub fn mentions_pool_exhaustion(message: &str) -> bool {
    RE_POOL_EXHAUSTED.is_match(message)
}

/// Recurring connection-pool exhaustion messages in the trailing window.
pub fn check_pool_exhaustion(timeline: &Timeline, cfg: &TrendConfig) -> Option<TrendAlert> {
    let window = timeline.recent_minutes(cfg.latency_window_minutes);
    let hits: Vec<&LogEvent> = window.iter().filter(|e| mentions_pool_exhaustion(&e.message)).collect();
    if hits.is_empty() || hits.len() < cfg.min_pool_events {
        return None;
    }
    let services = services_by_count(hits.iter().copied());
    let top = lead_service(&services);
    Some(TrendAlert {
        kind: TrendKind::ConnectionPoolExhaustion,
        severity: Severity::Critical,
        description: format!(
            "Detected {} connection-pool exhaustion events in the last {} minutes.",
            hits.len(),
            cfg.latency_window_minutes
        ),
        current_value: hits.len() as f64,
        baseline_value: cfg.min_pool_events as f64,
        confidence: cfg.pool_confidence,
        window_minutes: cfg.latency_window_minutes,
        recommended_actions: vec![
            format!("Restart {top} to release held connections"),
            "Raise the connection pool limit or shorten idle timeouts".to_string(),
            "Audit recent changes that affect connection usage".to_string(),
        ],
        affected_services: services,
    })
}

/// Service names ordered by descending event count, then name.
fn services_by_count<'a, I>(events: I) -> Vec<String>
where
    I: Iterator<Item = &'a LogEvent>,
{
    events
        .map(|e| e.service.as_str())
        .counts()
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn lead_service(services: &[String]) -> &str {
    services.first().map(String::as_str).unwrap_or("the affected services")
}
