//! Command-line surface of the `log-watcher` binary.

use clap::Parser;
use std::path::{Path, PathBuf};

use crate::config::{ConfigBuilder, WatcherConfig};
use crate::error::{Error, Result};

pub const DEFAULT_OUTPUT_FILE: &str = "./logwatcher_output.json";

/// Tail a log file, following rotation and truncation, and print lines at or
/// above a minimum severity.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "log-watcher", version, about)]
pub struct Cli {
    /// Log file to watch.
    pub filename: PathBuf,

    /// Minimum severity to report (DEBUG, INFO, WARN, ERROR).
    #[arg(short = 'l', long = "min-level")]
    pub min_level: Option<String>,

    /// Disable ANSI colours in console output.
    #[arg(long)]
    pub no_colors: bool,

    /// Seconds between polls.
    #[arg(short, long)]
    pub interval: Option<f64>,

    /// Keep reading the original file after it is rotated away.
    #[arg(long)]
    pub no_follow_rotation: bool,

    /// Also append every event as a JSON line to the output file.
    #[arg(long)]
    pub json_output: bool,

    /// Destination for --json-output.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    pub output_file: PathBuf,

    /// Print a statistics report on exit.
    #[arg(short, long)]
    pub stats: bool,

    /// Reopen attempts after a read failure before giving up.
    #[arg(long)]
    pub max_retries: Option<i64>,

    /// Seconds to wait before each reopen attempt.
    #[arg(long)]
    pub retry_delay: Option<f64>,

    /// Text encoding of the file (utf-8, latin-1, ascii).
    #[arg(short, long)]
    pub encoding: Option<String>,

    /// TOML file with watcher settings; flags given here override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Builds the watcher config: defaults, then the config file, then flags.
    pub fn watcher_config(&self) -> Result<WatcherConfig> {
        let mut builder = match &self.config {
            Some(path) => ConfigBuilder::load(path)?,
            None => WatcherConfig::builder(),
        };

        if let Some(level) = &self.min_level {
            builder = builder.min_severity(level.as_str());
        }
        if let Some(interval) = self.interval {
            builder = builder.poll_interval(interval);
        }
        if let Some(retries) = self.max_retries {
            builder = builder.max_retries(retries);
        }
        if let Some(delay) = self.retry_delay {
            builder = builder.retry_delay(delay);
        }
        if let Some(encoding) = &self.encoding {
            builder = builder.encoding(encoding.as_str());
        }
        if self.no_colors {
            builder = builder.use_colors(false);
        }
        if self.no_follow_rotation {
            builder = builder.follow_rotation(false);
        }

        builder.build()
    }

    /// Rejects paths that are missing or not regular files.
    pub fn validate_target(&self) -> Result<()> {
        validate_log_path(&self.filename)
    }
}

pub fn validate_log_path(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| Error::from_open(path, e))?;
    if !metadata.is_file() {
        return Err(Error::invalid_config(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(())
}
