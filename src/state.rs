//! Watcher lifecycle states.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of a [`Watcher`](crate::Watcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Stopped,
    Running,
    Paused,
    /// Retries ran out. Terminal: a new watcher is needed to watch again.
    Errored,
}

impl WatcherState {
    pub fn as_str(self) -> &'static str {
        match self {
            WatcherState::Stopped => "stopped",
            WatcherState::Running => "running",
            WatcherState::Paused => "paused",
            WatcherState::Errored => "errored",
        }
    }
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// `stop()` was called.
    Requested,
    /// Reopen attempts ran out after a read failure.
    RetriesExhausted,
}
