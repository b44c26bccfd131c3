//! Severity levels and the minimum-severity filter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Ordered log level. `Debug < Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    #[serde(alias = "WARNING")]
    Warn,
    Error,
}

impl Severity {
    /// All levels, lowest first.
    pub const ALL: [Severity; 4] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
    ];

    /// Ordinal position: DEBUG=0, INFO=1, WARN=2, ERROR=3.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Debug => 0,
            Severity::Info => 1,
            Severity::Warn => 2,
            Severity::Error => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Parses a level label, accepting `WARNING` and any casing.
    pub fn from_label(label: &str) -> Option<Severity> {
        match label.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Severity::Debug),
            "INFO" => Some(Severity::Info),
            "WARN" | "WARNING" => Some(Severity::Warn),
            "ERROR" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::from_label(s).ok_or_else(|| {
            Error::invalid_config(format!(
                "unknown severity '{}', expected one of DEBUG, INFO, WARN, ERROR",
                s
            ))
        })
    }
}

/// True iff `detected` ranks at or above `minimum`.
pub fn should_emit(detected: Severity, minimum: Severity) -> bool {
    detected.rank() >= minimum.rank()
}

/// Minimum-severity gate applied before fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityFilter {
    minimum: Severity,
    unknown_as: Severity,
}

impl SeverityFilter {
    pub fn new(minimum: Severity) -> Self {
        Self {
            minimum,
            unknown_as: Severity::Debug,
        }
    }

    /// Rank unrecognised labels as `severity` instead of DEBUG.
    pub fn with_unknown_as(mut self, severity: Severity) -> Self {
        self.unknown_as = severity;
        self
    }

    pub fn minimum(&self) -> Severity {
        self.minimum
    }

    pub fn admits(&self, detected: Severity) -> bool {
        should_emit(detected, self.minimum)
    }

    /// Label form of [`SeverityFilter::admits`]; never fails.
    pub fn admits_label(&self, label: &str) -> bool {
        let detected = Severity::from_label(label).unwrap_or(self.unknown_as);
        self.admits(detected)
    }
}

impl Default for SeverityFilter {
    fn default() -> Self {
        Self::new(Severity::Warn)
    }
}
