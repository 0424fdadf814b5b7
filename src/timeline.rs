use crate::event::LogEvent;
use crate::normalize::NormalizedRecord;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Write as _;

/// Events from every source, ascending by timestamp. Equal timestamps keep
/// their input order (source order, then record order).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Timeline {
    events: Vec<LogEvent>,
}

impl Timeline {
    /// Build from normalized records in input order. Records whose timestamp
    /// never resolved are dropped, and their count is returned alongside.
    pub fn build<I>(records: I) -> (Timeline, usize)
    where
        I: IntoIterator<Item = NormalizedRecord>,
    {
        let mut dropped = 0usize;
        let mut events = Vec::new();
        for rec in records {
            match rec.into_event() {
                Some(ev) => events.push(ev),
                None => dropped += 1,
            }
        }
        (Timeline::from_events(events), dropped)
    }

    pub fn from_events(mut events: Vec<LogEvent>) -> Timeline {
        // sort_by_key is stable
        events.sort_by_key(|e| e.timestamp);
        Timeline { events }
    }

    pub fn empty() -> Timeline {
        Timeline::default()
    }

    pub fn len(&self) -> usize { self.events.len() }

    pub fn is_empty(&self) -> bool { self.events.is_empty() }

    pub fn events(&self) -> &[LogEvent] { &self.events }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEvent> { self.events.iter() }

    pub fn into_events(self) -> Vec<LogEvent> { self.events }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.first().map(|e| e.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.last().map(|e| e.timestamp)
    }

    /// Events from one source, matched on the full path or the file name.
    pub fn from_source(&self, source: &str) -> Timeline {
        let events = self
            .events
            .iter()
            .filter(|e| e.source == source || e.source_name() == source)
            .cloned()
            .collect();
        Timeline { events }
    }

    /// Trailing slice covering `window` back from the latest event, inclusive.
    /// A cutoff before the earliest representable instant keeps everything.
    pub fn recent(&self, window: Duration) -> &[LogEvent] {
        let Some(last) = self.last_timestamp() else { return &[] };
        let Some(cutoff) = last.checked_sub_signed(window) else { return &self.events };
        let start = self.events.partition_point(|e| e.timestamp < cutoff);
        &self.events[start..]
    }

    /// [`Timeline::recent`] with the window in minutes. A window too wide
    /// for `Duration` covers the whole timeline.
    pub fn recent_minutes(&self, minutes: i64) -> &[LogEvent] {
        match Duration::try_minutes(minutes) {
            Some(window) => self.recent(window),
            None => &self.events,
        }
    }

    /// Plain-text table, one event per row, for handing to a summarizer.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<24} {:<6} {:<20} {:<24} {}", "timestamp", "level", "service", "source", "message");
        for e in &self.events {
            let _ = writeln!(
                out,
                "{:<24} {:<6} {:<20} {:<24} {}",
                e.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                e.level.as_str(),
                e.service,
                e.source_name(),
                e.message
            );
        }
        out
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a LogEvent;
    type IntoIter = std::slice::Iter<'a, LogEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
