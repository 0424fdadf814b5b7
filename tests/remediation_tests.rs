use chrono::{TimeZone, Utc};
use clarity::event::{Level, LogEvent};
use clarity::remediation::{self, RemediationError, RemediationRequest, RemediationTool};
use clarity::timeline::Timeline;
use std::collections::BTreeMap;

fn ev(sec: u32, level: Level, service: &str) -> LogEvent {
    LogEvent {
        timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, sec).unwrap(),
        level,
        service: service.into(),
        message: "m".into(),
        source: "a.log".into(),
        metadata: BTreeMap::new(),
    }
}

#[test]
fn sanitize_strips_shell_metacharacters() {
    assert_eq!(remediation::sanitize("payments; rm -rf /"), "paymentsrm-rf");
    assert_eq!(remediation::sanitize("api-gateway"), "api-gateway");
    assert_eq!(remediation::sanitize("$(whoami)"), "whoami");
}

#[test]
fn builds_each_command_shape() {
    let req = RemediationRequest::new("payments", "prod");
    let rollback = RemediationTool::Rollback.command(&req).unwrap();
    assert_eq!(rollback.command, "kubectl rollout undo deployment/payments -n prod");
    assert_eq!(rollback.tool, "rollback");

    let restart = RemediationTool::Restart.command(&req).unwrap();
    assert_eq!(restart.command, "kubectl rollout restart deployment/payments -n prod");

    let scale = RemediationTool::Scale { replicas: 4 }.command(&req).unwrap();
    assert_eq!(scale.command, "kubectl scale deployment/payments --replicas=4 -n prod");
    assert_eq!(scale.tool, "scale");
}

#[test]
fn empty_service_is_rejected_and_empty_namespace_defaults() {
    let err = RemediationTool::Restart.command(&RemediationRequest::new(";;", "prod")).unwrap_err();
    assert_eq!(err, RemediationError::EmptyService);

    let cmd = RemediationTool::Restart.command(&RemediationRequest::new("api", "")).unwrap();
    assert_eq!(cmd.namespace, "default");
}

#[test]
fn request_namespace_defaults_when_deserialized() {
    let req: RemediationRequest = serde_json::from_str(r#"{"service_name":"api"}"#).unwrap();
    assert_eq!(req.namespace, "default");
}

#[test]
fn exhaustion_means_restart_otherwise_rollback() {
    assert_eq!(remediation::choose_tool("Connection pool EXHAUSTED"), RemediationTool::Restart);
    assert_eq!(remediation::choose_tool("bad config pushed in release 2.3"), RemediationTool::Rollback);
}

#[test]
fn picks_named_service_before_busiest_one() {
    let tl = Timeline::from_events(vec![
        ev(0, Level::Error, "db"),
        ev(1, Level::Error, "db"),
        ev(2, Level::Error, "api"),
        ev(3, Level::Info, "unknown"),
    ]);
    assert_eq!(remediation::pick_service("api returned 502", &tl).as_deref(), Some("api"));
    assert_eq!(remediation::pick_service("something broke", &tl).as_deref(), Some("db"));
    assert_eq!(remediation::pick_service("anything", &Timeline::empty()), None);
}

#[test]
fn suggest_combines_tool_and_target() {
    let tl = Timeline::from_events(vec![ev(0, Level::Error, "payments")]);
    let cmd = remediation::suggest("pool exhausted", &tl, "prod").unwrap();
    assert_eq!(cmd.command, "kubectl rollout restart deployment/payments -n prod");
}
