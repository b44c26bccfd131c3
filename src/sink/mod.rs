//! Fan-out targets for classified entries and lifecycle events.

mod console;
mod json;
mod stats;

pub use console::ConsoleSink;
pub use json::JsonLinesSink;
pub use stats::{
    EntryStats, ErrorStats, EventStats, RECENT_EVENT_CAPACITY, RecentEvent, StatsCollector,
    StatsSnapshot, TimingStats,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::event::WatchEvent;

/// A consumer of watch events.
///
/// Sinks run synchronously on the polling task, in registration order. An
/// error (or panic) from one sink is logged by the watcher and does not reach
/// the other sinks or stop the watch.
pub trait Sink: Send + Sync {
    fn handle(&self, event: &WatchEvent) -> Result<()>;

    /// Label used in log output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Sinks keep going after another thread panicked mid-update.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
