//! Events delivered to sinks: classified lines and lifecycle notices.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::Metadata;

use crate::severity::Severity;
use crate::state::WatcherState;

/// Identifies the physical file behind a path, independent of the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileIdentity {
    pub device: u64,
    pub inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        }
    }

    /// Without inodes, the creation time is the closest stable stand-in.
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        Self {
            device: 0,
            inode: created,
        }
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}

/// A line after classification. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEntry {
    raw_line: String,
    severity: Severity,
    message: String,
    source: String,
    timestamp: DateTime<Utc>,
}

impl ClassifiedEntry {
    pub fn new(
        raw_line: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            raw_line: raw_line.into(),
            severity,
            message: message.into(),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn raw_line(&self) -> &str {
        &self.raw_line
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// What happened to the watched file or the watcher itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LifecycleKind {
    Rotated {
        old_identity: FileIdentity,
        new_identity: FileIdentity,
    },
    Truncated {
        old_size: u64,
        new_size: u64,
    },
    ReadError {
        description: String,
    },
    StateChanged {
        old_state: WatcherState,
        new_state: WatcherState,
    },
}

impl LifecycleKind {
    /// Stable name used for stats keys and JSON records.
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleKind::Rotated { .. } => "file_rotation",
            LifecycleKind::Truncated { .. } => "file_truncated",
            LifecycleKind::ReadError { .. } => "file_error",
            LifecycleKind::StateChanged { .. } => "state_changed",
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleKind::Rotated {
                old_identity,
                new_identity,
            } => write!(f, "file rotated ({} -> {})", old_identity, new_identity),
            LifecycleKind::Truncated { old_size, new_size } => {
                write!(f, "file truncated ({} -> {} bytes)", old_size, new_size)
            }
            LifecycleKind::ReadError { description } => write!(f, "read error: {}", description),
            LifecycleKind::StateChanged {
                old_state,
                new_state,
            } => write!(f, "state {} -> {}", old_state, new_state),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

/// Everything a sink can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Entry(ClassifiedEntry),
    Lifecycle(LifecycleEvent),
}

impl WatchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WatchEvent::Entry(_) => "log_entry",
            WatchEvent::Lifecycle(event) => event.event_type(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WatchEvent::Entry(entry) => entry.timestamp(),
            WatchEvent::Lifecycle(event) => event.timestamp,
        }
    }

    pub fn as_entry(&self) -> Option<&ClassifiedEntry> {
        match self {
            WatchEvent::Entry(entry) => Some(entry),
            WatchEvent::Lifecycle(_) => None,
        }
    }

    pub fn as_lifecycle(&self) -> Option<&LifecycleEvent> {
        match self {
            WatchEvent::Entry(_) => None,
            WatchEvent::Lifecycle(event) => Some(event),
        }
    }
}

impl From<ClassifiedEntry> for WatchEvent {
    fn from(entry: ClassifiedEntry) -> Self {
        WatchEvent::Entry(entry)
    }
}

impl From<LifecycleKind> for WatchEvent {
    fn from(kind: LifecycleKind) -> Self {
        WatchEvent::Lifecycle(LifecycleEvent::new(kind))
    }
}
