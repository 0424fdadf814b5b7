use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clarity::config::SummarizerConfig;
use clarity::event::{Level, LogEvent};
use clarity::summarizer::{self, ReportOrigin, Summarizer, SummarizerError};
use clarity::timeline::Timeline;
use std::collections::BTreeMap;

fn ev(offset_secs: i64, level: Level, service: &str, msg: &str) -> LogEvent {
    LogEvent {
        timestamp: DateTime::parse_from_rfc3339("2024-01-15T10:00:00Z").unwrap().with_timezone(&Utc)
            + Duration::seconds(offset_secs),
        level,
        service: service.into(),
        message: msg.into(),
        source: "/logs/payments.log".into(),
        metadata: BTreeMap::new(),
    }
}

fn incident() -> Timeline {
    Timeline::from_events(vec![
        ev(0, Level::Info, "deployer", "deploy payments v2.3.1 started"),
        ev(30, Level::Info, "payments", "serving traffic"),
        ev(60, Level::Error, "payments", "connection pool exhausted, 50/50 in use"),
        ev(61, Level::Error, "payments", "request failed: pool timeout"),
    ])
}

const VALID: &str = r#"{
    "summary": "Payments outage after deploy",
    "root_cause": "The new release leaks connections.",
    "evidence": ["pool exhausted at 10:01"],
    "recommended_action": "Roll back payments",
    "confidence_score": 0.9,
    "executable_command": "kubectl rollout undo deployment/payments -n default"
}"#;

#[test]
fn parses_a_wrapped_response() {
    let text = format!("Here is the analysis:\n```json\n{VALID}\n```\n");
    let report = summarizer::parse_response(&text).unwrap();
    assert_eq!(report.summary, "Payments outage after deploy");
    assert_eq!(report.evidence, vec!["pool exhausted at 10:01".to_string()]);
    assert_eq!(report.confidence_score, 0.9);
    assert_eq!(report.origin, ReportOrigin::Collaborator);
    assert_eq!(
        report.executable_command.as_deref(),
        Some("kubectl rollout undo deployment/payments -n default")
    );
}

#[test]
fn accepts_alternate_root_cause_key_and_string_evidence() {
    let text = r#"{"summary":"s","root_cause_description":"rc","evidence":"one line","confidence_score":0.4,"executable_command":""}"#;
    let report = summarizer::parse_response(text).unwrap();
    assert_eq!(report.root_cause, "rc");
    assert_eq!(report.evidence, vec!["one line".to_string()]);
    assert_eq!(report.executable_command, None);
    assert_eq!(report.recommended_action, "");
}

#[test]
fn error_prefixed_response_is_a_reported_failure() {
    let err = summarizer::parse_response("Error: quota exceeded").unwrap_err();
    assert_eq!(err, SummarizerError::Reported("quota exceeded".into()));
}

#[test]
fn malformed_responses_are_rejected() {
    assert!(matches!(summarizer::parse_response("no json here"), Err(SummarizerError::Malformed(_))));
    assert!(matches!(summarizer::parse_response("} backwards {"), Err(SummarizerError::Malformed(_))));
    assert!(matches!(
        summarizer::parse_response(r#"{"summary":"s","root_cause":"r","confidence_score":1.5}"#),
        Err(SummarizerError::Malformed(_))
    ));
    assert!(matches!(
        summarizer::parse_response(r#"{"summary":"","root_cause":"r","confidence_score":0.5}"#),
        Err(SummarizerError::Malformed(_))
    ));
    assert!(matches!(
        summarizer::parse_response(r#"{"summary":"s","confidence_score":0.5}"#),
        Err(SummarizerError::Malformed(_))
    ));
}

#[test]
fn prompt_embeds_schema_and_rendered_timeline() {
    let prompt = summarizer::build_rca_prompt(&incident());
    assert!(prompt.contains(summarizer::RESPONSE_SCHEMA));
    assert!(prompt.contains("connection pool exhausted"));
    assert!(prompt.contains("--- LOG DATA START ---"));
}

#[test]
fn fallback_names_first_error_and_preceding_change() {
    let report = summarizer::fallback_report(&incident(), "prod");
    assert_eq!(report.origin, ReportOrigin::Fallback);
    assert_eq!(report.summary, "Local analysis: found 2 errors in 4 events across 1 sources.");
    assert!(report.root_cause.contains("payments"));
    assert!(report.root_cause.contains("deploy payments v2.3.1"));
    assert!(report.root_cause.contains("pool exhaustion"));
    assert_eq!(report.confidence_score, 0.6);
    // change event first, then the errors
    assert_eq!(report.evidence.len(), 3);
    assert!(report.evidence[0].contains("deploy"));
    assert_eq!(
        report.executable_command.as_deref(),
        Some("kubectl rollout restart deployment/payments -n prod")
    );
}

#[test]
fn fallback_without_errors_has_low_confidence() {
    let tl = Timeline::from_events(vec![ev(0, Level::Info, "api", "all good")]);
    let report = summarizer::fallback_report(&tl, "default");
    assert_eq!(report.confidence_score, 0.2);
    assert!(report.evidence.is_empty());
    assert!(report.executable_command.is_none());
}

struct Canned(Result<String, SummarizerError>);

#[async_trait]
impl Summarizer for Canned {
    async fn complete(&self, _prompt: &str) -> Result<String, SummarizerError> {
        self.0.clone()
    }
}

struct Stalled;

#[async_trait]
impl Summarizer for Stalled {
    async fn complete(&self, _prompt: &str) -> Result<String, SummarizerError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(VALID.to_string())
    }
}

#[tokio::test]
async fn collaborator_report_is_used_when_valid() {
    let client = Canned(Ok(VALID.to_string()));
    let report = summarizer::analyze_incident(&incident(), Some(&client), &SummarizerConfig::default()).await;
    assert_eq!(report.origin, ReportOrigin::Collaborator);
    assert_eq!(report.summary, "Payments outage after deploy");
}

#[tokio::test]
async fn missing_command_is_filled_in_locally() {
    let client = Canned(Ok(
        r#"{"summary":"payments down","root_cause":"pool exhausted in payments","confidence_score":0.7}"#.to_string(),
    ));
    let report = summarizer::analyze_incident(&incident(), Some(&client), &SummarizerConfig::default()).await;
    assert_eq!(report.origin, ReportOrigin::Collaborator);
    assert_eq!(
        report.executable_command.as_deref(),
        Some("kubectl rollout restart deployment/payments -n default")
    );
}

#[tokio::test]
async fn collaborator_failures_degrade_to_local_analysis() {
    let cfg = SummarizerConfig::default();
    for client in [
        Canned(Err(SummarizerError::RateLimited)),
        Canned(Ok("Error: model overloaded".into())),
        Canned(Ok("I cannot help with that".into())),
    ] {
        let report = summarizer::analyze_incident(&incident(), Some(&client), &cfg).await;
        assert_eq!(report.origin, ReportOrigin::Fallback);
    }
    let report = summarizer::analyze_incident(&incident(), None, &cfg).await;
    assert_eq!(report.origin, ReportOrigin::Fallback);
}

#[tokio::test]
async fn slow_collaborator_times_out_to_fallback() {
    let cfg = SummarizerConfig { timeout_secs: 1, ..SummarizerConfig::default() };
    let report = summarizer::analyze_incident(&incident(), Some(&Stalled), &cfg).await;
    assert_eq!(report.origin, ReportOrigin::Fallback);
}
