use chrono::{DateTime, Duration, Utc};
use clarity::event::{Level, LogEvent};
use clarity::normalize::{self, NormalizedRecord};
use clarity::timeline::Timeline;
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn ev(ts: &str, msg: &str, source: &str) -> LogEvent {
    LogEvent {
        timestamp: at(ts),
        level: Level::Info,
        service: "api".into(),
        message: msg.into(),
        source: source.into(),
        metadata: BTreeMap::new(),
    }
}

fn rec(v: Value, source: &str) -> NormalizedRecord {
    match v {
        Value::Object(m) => normalize::normalize(m, source),
        _ => panic!("object expected"),
    }
}

#[test]
fn events_are_sorted_ascending() {
    let tl = Timeline::from_events(vec![
        ev("2024-01-15T10:02:00Z", "c", "a.log"),
        ev("2024-01-15T10:00:00Z", "a", "a.log"),
        ev("2024-01-15T10:01:00Z", "b", "a.log"),
    ]);
    let msgs: Vec<_> = tl.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(msgs, vec!["a", "b", "c"]);
    assert_eq!(tl.first_timestamp(), Some(at("2024-01-15T10:00:00Z")));
    assert_eq!(tl.last_timestamp(), Some(at("2024-01-15T10:02:00Z")));
}

#[test]
fn equal_timestamps_keep_input_order() {
    let tl = Timeline::from_events(vec![
        ev("2024-01-15T10:00:00Z", "first", "a.log"),
        ev("2024-01-15T09:00:00Z", "early", "b.log"),
        ev("2024-01-15T10:00:00Z", "second", "b.log"),
        ev("2024-01-15T10:00:00Z", "third", "a.log"),
    ]);
    let msgs: Vec<_> = tl.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(msgs, vec!["early", "first", "second", "third"]);
}

#[test]
fn build_drops_untimed_records_and_counts_them() {
    let records = vec![
        rec(json!({"timestamp": "2024-01-15T10:00:05Z", "message": "late"}), "a.json"),
        rec(json!({"message": "no time"}), "a.json"),
        rec(json!({"timestamp": "2024-01-15T10:00:00Z", "message": "early"}), "a.json"),
        rec(json!({"timestamp": "not a date", "message": "bad time"}), "a.json"),
    ];
    let (tl, dropped) = Timeline::build(records);
    assert_eq!(dropped, 2);
    let msgs: Vec<_> = tl.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(msgs, vec!["early", "late"]);
}

#[test]
fn empty_input_gives_empty_timeline() {
    let (tl, dropped) = Timeline::build(Vec::new());
    assert!(tl.is_empty());
    assert_eq!(dropped, 0);
    assert_eq!(tl, Timeline::empty());
    assert!(tl.recent(Duration::minutes(5)).is_empty());
    assert_eq!(tl.first_timestamp(), None);
}

#[test]
fn recent_window_is_inclusive_of_cutoff() {
    let tl = Timeline::from_events(vec![
        ev("2024-01-15T09:59:59Z", "outside", "a.log"),
        ev("2024-01-15T10:00:00Z", "edge", "a.log"),
        ev("2024-01-15T10:03:00Z", "inside", "a.log"),
        ev("2024-01-15T10:05:00Z", "last", "a.log"),
    ]);
    let msgs: Vec<_> = tl.recent(Duration::minutes(5)).iter().map(|e| e.message.as_str()).collect();
    assert_eq!(msgs, vec!["edge", "inside", "last"]);
}

#[test]
fn from_source_matches_path_or_file_name() {
    let tl = Timeline::from_events(vec![
        ev("2024-01-15T10:00:00Z", "db", "/var/log/db.log"),
        ev("2024-01-15T10:00:01Z", "api", "/var/log/api.log"),
        ev("2024-01-15T10:00:02Z", "db2", "/var/log/db.log"),
    ]);
    assert_eq!(tl.from_source("db.log").len(), 2);
    assert_eq!(tl.from_source("/var/log/api.log").len(), 1);
    assert!(tl.from_source("other.log").is_empty());
}

#[test]
fn serializes_as_a_plain_event_array() {
    let tl = Timeline::from_events(vec![ev("2024-01-15T10:00:00Z", "hello", "a.log")]);
    let v = serde_json::to_value(&tl).unwrap();
    assert!(v.is_array());
    assert_eq!(v[0]["level"], json!("INFO"));
    assert_eq!(v[0]["message"], json!("hello"));
}

#[test]
fn render_table_has_header_and_one_row_per_event() {
    let tl = Timeline::from_events(vec![
        ev("2024-01-15T10:00:00Z", "hello", "/tmp/a.log"),
        ev("2024-01-15T10:00:01Z", "world", "/tmp/a.log"),
    ]);
    let table = tl.render_table();
    let lines: Vec<_> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("timestamp"));
    assert!(lines[1].contains("2024-01-15T10:00:00Z"));
    assert!(lines[1].contains("a.log"));
    assert!(lines[2].ends_with("world"));
}

#[test]
fn window_reaching_past_representable_time_keeps_everything() {
    let tl = Timeline::from_events(vec![
        ev("2024-01-15T10:00:00Z", "a", "a.log"),
        ev("2024-01-15T10:05:00Z", "b", "a.log"),
    ]);
    assert_eq!(tl.recent(Duration::MAX).len(), 2);
    assert_eq!(tl.recent_minutes(i64::MAX).len(), 2);
    assert_eq!(tl.recent_minutes(1).len(), 1);
}
