use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use super::{Sink, lock};
use crate::error::Result;
use crate::event::{ClassifiedEntry, LifecycleEvent, WatchEvent};
use crate::severity::Severity;

/// How many lifecycle events the snapshot keeps, newest last.
pub const RECENT_EVENT_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryStats {
    pub total_lines: u64,
    pub by_severity: BTreeMap<Severity, u64>,
    pub by_source: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentEvent {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStats {
    pub total_events: u64,
    pub by_type: BTreeMap<String, u64>,
    pub recent: Vec<RecentEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    /// Lines the classifier rejected.
    pub dropped_lines: u64,
    pub sink_failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimingStats {
    pub started_at: Option<DateTime<Utc>>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_log_activity: Option<DateTime<Utc>>,
    pub last_event_activity: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
}

/// Point-in-time copy of everything a [`StatsCollector`] has counted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub log_entries: EntryStats,
    pub events: EventStats,
    pub errors: ErrorStats,
    pub timing: TimingStats,
}

struct StatsState {
    total_lines: u64,
    by_severity: BTreeMap<Severity, u64>,
    by_source: BTreeMap<String, u64>,
    total_events: u64,
    events_by_type: BTreeMap<String, u64>,
    recent: VecDeque<RecentEvent>,
    errors: ErrorStats,
    timing: TimingStats,
}

impl StatsState {
    fn new() -> Self {
        Self {
            total_lines: 0,
            by_severity: Severity::ALL.iter().map(|s| (*s, 0)).collect(),
            by_source: BTreeMap::new(),
            total_events: 0,
            events_by_type: BTreeMap::new(),
            recent: VecDeque::with_capacity(RECENT_EVENT_CAPACITY),
            errors: ErrorStats::default(),
            timing: TimingStats::default(),
        }
    }

    fn record_entry(&mut self, entry: &ClassifiedEntry) {
        self.total_lines += 1;
        *self.by_severity.entry(entry.severity()).or_insert(0) += 1;
        *self.by_source.entry(entry.source().to_string()).or_insert(0) += 1;

        let seen = entry.timestamp();
        self.timing.first_seen.get_or_insert(seen);
        self.timing.last_log_activity = Some(seen);
    }

    fn record_event(&mut self, event: &LifecycleEvent) {
        self.total_events += 1;
        *self
            .events_by_type
            .entry(event.event_type().to_string())
            .or_insert(0) += 1;

        if self.recent.len() == RECENT_EVENT_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(RecentEvent {
            event_type: event.event_type().to_string(),
            timestamp: event.timestamp,
            detail: event.kind.to_string(),
        });
        self.timing.last_event_activity = Some(event.timestamp);
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut timing = self.timing.clone();
        if let Some(started) = timing.started_at {
            let end = timing.finished_at.unwrap_or_else(Utc::now);
            timing.duration_seconds = (end - started).num_milliseconds().max(0) as f64 / 1000.0;
        }

        StatsSnapshot {
            log_entries: EntryStats {
                total_lines: self.total_lines,
                by_severity: self.by_severity.clone(),
                by_source: self.by_source.clone(),
            },
            events: EventStats {
                total_events: self.total_events,
                by_type: self.events_by_type.clone(),
                recent: self.recent.iter().cloned().collect(),
            },
            errors: self.errors.clone(),
            timing,
        }
    }
}

/// Sink that counts what flows through a watcher.
pub struct StatsCollector {
    state: Mutex<StatsState>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StatsState::new()),
        }
    }

    /// Starts the duration clock. Later calls are ignored.
    pub fn mark_started(&self) {
        let mut state = lock(&self.state);
        state.timing.started_at.get_or_insert_with(Utc::now);
    }

    /// Stops the duration clock. Later calls are ignored.
    pub fn finalize(&self) {
        let mut state = lock(&self.state);
        if state.timing.started_at.is_some() && state.timing.finished_at.is_none() {
            state.timing.finished_at = Some(Utc::now());
        }
    }

    pub fn record_dropped_line(&self) {
        lock(&self.state).errors.dropped_lines += 1;
    }

    pub fn record_sink_failure(&self) {
        lock(&self.state).errors.sink_failures += 1;
    }

    /// Owned copy; ingestion can continue while the caller reads it.
    pub fn snapshot(&self) -> StatsSnapshot {
        lock(&self.state).snapshot()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for StatsCollector {
    fn handle(&self, event: &WatchEvent) -> Result<()> {
        let mut state = lock(&self.state);
        match event {
            WatchEvent::Entry(entry) => state.record_entry(entry),
            WatchEvent::Lifecycle(event) => state.record_event(event),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stats"
    }
}
