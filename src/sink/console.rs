use std::io::Write;
use std::sync::Mutex;

use super::{Sink, lock};
use crate::error::Result;
use crate::event::{LifecycleEvent, WatchEvent};
use crate::severity::Severity;

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

fn color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "\x1b[91m",
        Severity::Warn => "\x1b[93m",
        Severity::Info => "\x1b[92m",
        Severity::Debug => "\x1b[94m",
    }
}

/// `[LEVEL] message`, wrapped in the level's ANSI colour when enabled.
pub fn format_entry(severity: Severity, message: &str, use_colors: bool) -> String {
    if use_colors {
        format!("{}[{}] {}{}", color(severity), severity, message, RESET)
    } else {
        format!("[{}] {}", severity, message)
    }
}

fn format_lifecycle(event: &LifecycleEvent, use_colors: bool) -> String {
    if use_colors {
        format!("{}[watcher] {}{}", DIM, event.kind, RESET)
    } else {
        format!("[watcher] {}", event.kind)
    }
}

/// Prints events as text lines, to stdout by default.
pub struct ConsoleSink {
    use_colors: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn new(use_colors: bool) -> Self {
        Self::with_writer(use_colors, std::io::stdout())
    }

    pub fn with_writer<W: Write + Send + 'static>(use_colors: bool, writer: W) -> Self {
        Self {
            use_colors,
            out: Mutex::new(Box::new(writer)),
        }
    }
}

impl Sink for ConsoleSink {
    fn handle(&self, event: &WatchEvent) -> Result<()> {
        let line = match event {
            WatchEvent::Entry(entry) => {
                format_entry(entry.severity(), entry.message(), self.use_colors)
            }
            WatchEvent::Lifecycle(event) => format_lifecycle(event, self.use_colors),
        };

        let mut out = lock(&self.out);
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
