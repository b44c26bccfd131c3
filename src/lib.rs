//! A log watcher library that tails a growing file in real time.
//!
//! The watcher follows the file across rotation and truncation, classifies
//! each new line by severity and delivers the lines at or above a minimum
//! severity, together with lifecycle notices, to any number of sinks.
//! Transient read failures are retried a bounded number of times.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_watcher::{ConsoleSink, Watcher, WatcherConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WatcherConfig::builder().min_severity("INFO").build()?;
//!     let watcher = Arc::new(Watcher::new("app.log", config));
//!     watcher.add_sink(Arc::new(ConsoleSink::new(true)));
//!
//!     let handle = tokio::spawn({
//!         let watcher = watcher.clone();
//!         async move { watcher.start().await }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     watcher.stop();
//!     handle.await??;
//!     Ok(())
//! }
//! ```
//!
//! Events can also be consumed as an async stream:
//!
//! ```rust,no_run
//! use log_watcher::{Watcher, WatcherConfig, WatchEvent};
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = Arc::new(Watcher::new("app.log", WatcherConfig::default()));
//!     let mut events = watcher.subscribe();
//!     tokio::spawn({
//!         let watcher = watcher.clone();
//!         async move { watcher.start().await }
//!     });
//!
//!     while let Some(event) = events.next().await {
//!         if let WatchEvent::Entry(entry) = event {
//!             println!("{}: {}", entry.severity(), entry.message());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod logging;
pub mod sink;

mod classify;
mod config;
mod encoding;
mod error;
mod event;
mod severity;
mod state;
mod stream;
mod tail;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use classify::{
    Classification, DEFAULT_LEVEL_PATTERN, JsonLineClassifier, KeywordClassifier,
    LineClassifier, RegexClassifier,
};
pub use config::{ConfigBuilder, WatcherConfig};
pub use encoding::TextEncoding;
pub use error::{Error, Result};
pub use event::{ClassifiedEntry, FileIdentity, LifecycleEvent, LifecycleKind, WatchEvent};
pub use severity::{Severity, SeverityFilter, should_emit};
pub use sink::{ConsoleSink, JsonLinesSink, Sink, StatsCollector, StatsSnapshot};
pub use state::{StopCause, WatcherState};
pub use stream::EventStream;
pub use tail::{MAX_LINE_BYTES, TailEngine};
pub use watcher::Watcher;
