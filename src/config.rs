//! Watcher configuration: building, validation and TOML loading.
//!
//! Every path into a [`WatcherConfig`] goes through [`ConfigBuilder::build`],
//! so an invalid value fails construction instead of surfacing mid-watch.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::encoding::TextEncoding;
use crate::error::{Error, Result};
use crate::severity::Severity;

/// Validated watcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    poll_interval: Duration,
    follow_rotation: bool,
    min_severity: Severity,
    max_retries: u32,
    retry_delay: Duration,
    restart_on_error: bool,
    encoding: TextEncoding,
    collect_stats: bool,
    use_colors: bool,
}

impl WatcherConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        ConfigBuilder::load(path)?.build()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        ConfigBuilder::from_toml_str(contents)?.build()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn follow_rotation(&self) -> bool {
        self.follow_rotation
    }

    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn restart_on_error(&self) -> bool {
        self.restart_on_error
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn collect_stats(&self) -> bool {
        self.collect_stats
    }

    pub fn use_colors(&self) -> bool {
        self.use_colors
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            follow_rotation: true,
            min_severity: Severity::Warn,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            restart_on_error: true,
            encoding: TextEncoding::Utf8,
            collect_stats: true,
            use_colors: true,
        }
    }
}

/// Unvalidated settings in their user-facing units (seconds, names).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigBuilder {
    poll_interval: f64,
    follow_rotation: bool,
    min_severity: String,
    max_retries: i64,
    retry_delay: f64,
    restart_on_error: bool,
    encoding: String,
    collect_stats: bool,
    use_colors: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        let defaults = WatcherConfig::default();
        Self {
            poll_interval: defaults.poll_interval.as_secs_f64(),
            follow_rotation: defaults.follow_rotation,
            min_severity: defaults.min_severity.to_string(),
            max_retries: i64::from(defaults.max_retries),
            retry_delay: defaults.retry_delay.as_secs_f64(),
            restart_on_error: defaults.restart_on_error,
            encoding: defaults.encoding.to_string(),
            collect_stats: defaults.collect_stats,
            use_colors: defaults.use_colors,
        }
    }
}

impl ConfigBuilder {
    /// Reads a TOML file without validating it, so callers can layer
    /// further overrides before [`ConfigBuilder::build`].
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Keys left out of `contents` keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Seconds between polls; must be positive.
    pub fn poll_interval(mut self, seconds: f64) -> Self {
        self.poll_interval = seconds;
        self
    }

    pub fn follow_rotation(mut self, follow: bool) -> Self {
        self.follow_rotation = follow;
        self
    }

    pub fn min_severity(mut self, severity: impl Into<String>) -> Self {
        self.min_severity = severity.into();
        self
    }

    pub fn max_retries(mut self, retries: i64) -> Self {
        self.max_retries = retries;
        self
    }

    /// Seconds to wait before each reopen attempt; must not be negative.
    pub fn retry_delay(mut self, seconds: f64) -> Self {
        self.retry_delay = seconds;
        self
    }

    pub fn restart_on_error(mut self, restart: bool) -> Self {
        self.restart_on_error = restart;
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn collect_stats(mut self, collect: bool) -> Self {
        self.collect_stats = collect;
        self
    }

    pub fn use_colors(mut self, colors: bool) -> Self {
        self.use_colors = colors;
        self
    }

    pub fn build(self) -> Result<WatcherConfig> {
        if !(self.poll_interval.is_finite() && self.poll_interval > 0.0) {
            return Err(Error::invalid_config(format!(
                "poll_interval must be positive, got {}",
                self.poll_interval
            )));
        }
        if !(self.retry_delay.is_finite() && self.retry_delay >= 0.0) {
            return Err(Error::invalid_config(format!(
                "retry_delay can't be negative, got {}",
                self.retry_delay
            )));
        }
        let max_retries = u32::try_from(self.max_retries).map_err(|_| {
            Error::invalid_config(format!(
                "max_retries must be between 0 and {}, got {}",
                u32::MAX,
                self.max_retries
            ))
        })?;

        Ok(WatcherConfig {
            poll_interval: seconds(self.poll_interval, "poll_interval")?,
            follow_rotation: self.follow_rotation,
            min_severity: self.min_severity.parse()?,
            max_retries,
            retry_delay: seconds(self.retry_delay, "retry_delay")?,
            restart_on_error: self.restart_on_error,
            encoding: self.encoding.parse()?,
            collect_stats: self.collect_stats,
            use_colors: self.use_colors,
        })
    }
}

fn seconds(value: f64, field: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| Error::invalid_config(format!("{} out of range: {}", field, e)))
}
