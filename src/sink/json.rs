use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Sink, lock};
use crate::error::Result;
use crate::event::{LifecycleKind, WatchEvent};
use crate::severity::Severity;

#[derive(Serialize)]
struct EntryRecord<'a> {
    event_type: &'static str,
    timestamp: String,
    raw_message: &'a str,
    parsed_message: &'a str,
    level: Severity,
    src: &'a str,
}

#[derive(Serialize)]
struct LifecycleRecord<'a> {
    event_type: &'static str,
    timestamp: String,
    src: &'static str,
    data: &'a LifecycleKind,
}

/// Renders one event as a single JSON object, without the trailing newline.
pub fn to_json_line(event: &WatchEvent) -> Result<String> {
    let line = match event {
        WatchEvent::Entry(entry) => serde_json::to_string(&EntryRecord {
            event_type: event.event_type(),
            timestamp: entry.timestamp().to_rfc3339(),
            raw_message: entry.raw_line(),
            parsed_message: entry.message(),
            level: entry.severity(),
            src: entry.source(),
        })?,
        WatchEvent::Lifecycle(lifecycle) => serde_json::to_string(&LifecycleRecord {
            event_type: lifecycle.event_type(),
            timestamp: lifecycle.timestamp.to_rfc3339(),
            src: "watcher",
            data: &lifecycle.kind,
        })?,
    };
    Ok(line)
}

/// Appends one JSON record per event.
///
/// Each record is written, flushed and synced before `handle` returns, so a
/// crash can only lose the record being written.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it and its parent directories.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for JsonLinesSink {
    fn handle(&self, event: &WatchEvent) -> Result<()> {
        let mut record = to_json_line(event)?;
        record.push('\n');

        let mut file = lock(&self.file);
        file.write_all(record.as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "json"
    }
}
