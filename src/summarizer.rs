//! Narrow interface to the external text-generation collaborator, and the
//! deterministic local summary used whenever that collaborator fails.

use crate::config::SummarizerConfig;
use crate::event::{LogEvent, UNKNOWN_SERVICE};
use crate::remediation;
use crate::timeline::Timeline;
use crate::trend;
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizerError {
    #[error("summarizer call failed: {0}")]
    Call(String),
    #[error("summarizer rate limited")]
    RateLimited,
    #[error("summarizer timed out after {0:?}")]
    Timeout(Duration),
    #[error("summarizer reported: {0}")]
    Reported(String),
    #[error("malformed summarizer response: {0}")]
    Malformed(String),
}

/// Text-in, text-out collaborator. Implementations own their client and
/// credentials; nothing global is assumed.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, SummarizerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOrigin {
    Collaborator,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcaReport {
    pub summary: String,
    pub root_cause: String,
    pub evidence: Vec<String>,
    pub recommended_action: String,
    pub confidence_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_command: Option<String>,
    pub origin: ReportOrigin,
}

pub const RESPONSE_SCHEMA: &str = r#"{
    "summary": "<one-sentence summary of the incident>",
    "root_cause": "<two to three sentences on the most likely root cause>",
    "evidence": ["<log lines or observations supporting the root cause>"],
    "recommended_action": "<what an engineer should do next>",
    "confidence_score": <number between 0.0 and 1.0>,
    "executable_command": "<single-line shell command, or empty string>"
}"#;

pub fn build_rca_prompt(timeline: &Timeline) -> String {
    format!(
        "You are an expert site reliability engineer performing root cause analysis.\n\
         Return a single JSON object and nothing else. It must begin with '{{' and end with '}}'.\n\n\
         JSON schema to follow:\n{RESPONSE_SCHEMA}\n\n\
         --- LOG DATA START ---\n{}--- LOG DATA END ---\n",
        timeline.render_table()
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EvidenceField {
    One(String),
    Many(Vec<serde_json::Value>),
}

#[derive(Deserialize)]
struct WireReport {
    summary: String,
    #[serde(alias = "root_cause_description")]
    root_cause: String,
    #[serde(default)]
    evidence: Option<EvidenceField>,
    #[serde(default)]
    recommended_action: Option<String>,
    confidence_score: f64,
    #[serde(default)]
    executable_command: Option<String>,
}

/// Validate a collaborator response against the report schema.
///
/// The JSON object may be wrapped in prose or code fences; the span from the
/// first `{` to the last `}` is what gets parsed.
pub fn parse_response(text: &str) -> Result<RcaReport, SummarizerError> {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("Error:") {
        return Err(SummarizerError::Reported(rest.trim().to_string()));
    }
    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(SummarizerError::Malformed("no JSON object found".into()));
    };
    if end < start {
        return Err(SummarizerError::Malformed("no JSON object found".into()));
    }
    let wire: WireReport = serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| SummarizerError::Malformed(e.to_string()))?;
    if wire.summary.trim().is_empty() || wire.root_cause.trim().is_empty() {
        return Err(SummarizerError::Malformed("summary and root cause must not be empty".into()));
    }
    if !(0.0..=1.0).contains(&wire.confidence_score) {
        return Err(SummarizerError::Malformed(format!(
            "confidence_score {} outside [0, 1]",
            wire.confidence_score
        )));
    }
    let evidence = match wire.evidence {
        None => Vec::new(),
        Some(EvidenceField::One(s)) => vec![s],
        Some(EvidenceField::Many(items)) => items
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    };
    Ok(RcaReport {
        summary: wire.summary,
        root_cause: wire.root_cause,
        evidence,
        recommended_action: wire.recommended_action.unwrap_or_default(),
        confidence_score: wire.confidence_score,
        executable_command: wire.executable_command.filter(|c| !c.trim().is_empty()),
        origin: ReportOrigin::Collaborator,
    })
}

const CHANGE_MARKERS: &[&str] = &["deploy", "config", "release", "rollout", "version", "migration"];

fn looks_like_change(e: &LogEvent) -> bool {
    let svc = e.service.to_lowercase();
    let msg = e.message.to_lowercase();
    CHANGE_MARKERS.iter().any(|m| svc.contains(m) || msg.contains(m))
}

fn describe(e: &LogEvent) -> String {
    format!(
        "{} [{}] {} {}",
        e.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        e.service,
        e.level,
        e.message
    )
}

/// Rule-based report built only from the timeline.
pub fn fallback_report(timeline: &Timeline, namespace: &str) -> RcaReport {
    let errors: Vec<&LogEvent> = timeline.iter().filter(|e| e.level.is_error()).collect();
    let sources = timeline.iter().map(|e| e.source.as_str()).collect::<std::collections::HashSet<_>>().len();
    let summary = format!(
        "Local analysis: found {} errors in {} events across {} sources.",
        errors.len(),
        timeline.len(),
        sources
    );

    let Some(first_error) = errors.first() else {
        return RcaReport {
            summary,
            root_cause: "No error-level events were found; the incident is not visible in these logs.".into(),
            evidence: Vec::new(),
            recommended_action: "Collect logs covering the incident window and rerun the analysis.".into(),
            confidence_score: 0.2,
            executable_command: None,
            origin: ReportOrigin::Fallback,
        };
    };

    let mut root_cause = format!(
        "The earliest error came from {} at {}: {}.",
        first_error.service,
        first_error.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        first_error.message
    );
    let preceding_change = timeline
        .iter()
        .take_while(|e| e.timestamp <= first_error.timestamp)
        .filter(|e| !e.level.is_error() && looks_like_change(e))
        .last();
    if let Some(change) = preceding_change {
        root_cause.push_str(&format!(" It follows a change recorded at {}: {}.", change.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true), change.message));
    }
    if errors.iter().any(|e| trend::mentions_pool_exhaustion(&e.message)) {
        root_cause.push_str(" Errors point to connection pool exhaustion.");
    }

    let mut evidence: Vec<String> = preceding_change.map(describe).into_iter().collect();
    evidence.extend(errors.iter().take(5).map(|e| describe(e)));

    let service_hint = if first_error.service == UNKNOWN_SERVICE { String::new() } else { first_error.service.clone() };
    let command = remediation::suggest(&format!("{root_cause} {service_hint}"), timeline, namespace);
    let recommended_action = command
        .as_ref()
        .map(|c| c.description.clone())
        .unwrap_or_else(|| "Review the listed errors and the change that preceded them.".into());

    RcaReport {
        summary,
        root_cause,
        evidence,
        recommended_action,
        confidence_score: if preceding_change.is_some() { 0.6 } else { 0.5 },
        executable_command: command.map(|c| c.command),
        origin: ReportOrigin::Fallback,
    }
}

/// Reactive path: ask the collaborator, bounded by the configured timeout,
/// and degrade to [`fallback_report`] on any failure.
pub async fn analyze_incident(
    timeline: &Timeline,
    summarizer: Option<&dyn Summarizer>,
    cfg: &SummarizerConfig,
) -> RcaReport {
    let Some(client) = summarizer else {
        return fallback_report(timeline, &cfg.namespace);
    };
    if timeline.is_empty() {
        return fallback_report(timeline, &cfg.namespace);
    }
    let prompt = build_rca_prompt(timeline);
    let limit = Duration::from_secs(cfg.timeout_secs);
    let outcome = match tokio::time::timeout(limit, client.complete(&prompt)).await {
        Ok(Ok(text)) => parse_response(&text),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(SummarizerError::Timeout(limit)),
    };
    match outcome {
        Ok(mut report) => {
            if report.executable_command.is_none() {
                let text = format!("{} {}", report.summary, report.root_cause);
                report.executable_command = remediation::suggest(&text, timeline, &cfg.namespace).map(|c| c.command);
            }
            report
        }
        Err(e) => {
            tracing::warn!("summarizer unavailable, using local analysis: {e}");
            fallback_report(timeline, &cfg.namespace)
        }
    }
}
