//! Line classification strategies.
//!
//! A [`LineClassifier`] turns one raw line into a severity and a message.
//! The watcher holds exactly one and never inspects how it works, so any
//! strategy can be swapped in through [`Watcher::with_classifier`].
//!
//! [`Watcher::with_classifier`]: crate::Watcher::with_classifier

use regex::Regex;

use crate::error::{Error, Result};
use crate::severity::Severity;

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    pub message: String,
}

impl Classification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Maps a raw line to a [`Classification`].
///
/// Returning an error drops the line; the watcher logs and counts it.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> Result<Classification>;
}

/// Searched in this order; the first level with a token match wins.
const LEVEL_TOKENS: [(Severity, &[&str]); 4] = [
    (Severity::Error, &["ERROR"]),
    (Severity::Warn, &["WARNING", "WARN"]),
    (Severity::Info, &["INFO"]),
    (Severity::Debug, &["DEBUG"]),
];

/// Default heuristic: look for a level keyword anywhere in the line.
///
/// `ERROR` beats `WARN`/`WARNING`, which beats `INFO`, which beats `DEBUG`,
/// regardless of where in the line each appears. The message is whatever
/// follows the keyword, minus leading `:`, `[`, `]` and spaces. Lines without
/// a keyword are `INFO` with the line as the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn find(line: &str) -> Option<(Severity, usize)> {
        let upper = line.to_ascii_uppercase();

        LEVEL_TOKENS.iter().find_map(|(severity, tokens)| {
            // Within one level, the earliest spelling in the line wins.
            tokens
                .iter()
                .filter_map(|token| find_token(&upper, token).map(|idx| (idx, idx + token.len())))
                .min_by_key(|(idx, _)| *idx)
                .map(|(_, end)| (*severity, end))
        })
    }
}

impl LineClassifier for KeywordClassifier {
    fn classify(&self, line: &str) -> Result<Classification> {
        match KeywordClassifier::find(line) {
            Some((severity, end)) => {
                Ok(Classification::new(severity, strip_separators(&line[end..])))
            }
            None => Ok(Classification::new(Severity::Info, line)),
        }
    }
}

/// Byte offset of the first standalone occurrence of `token` in `haystack`.
///
/// `haystack` must already be ASCII-uppercased; offsets are valid in the
/// original line because ASCII case mapping keeps byte lengths.
fn find_token(haystack: &str, token: &str) -> Option<usize> {
    haystack.match_indices(token).map(|(idx, _)| idx).find(|&idx| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + token.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn strip_separators(rest: &str) -> &str {
    rest.trim_start_matches([':', '[', ']', ' ']).trim_end()
}

/// Default pattern: `LEVEL: message`, `LEVEL[ message` and similar.
pub const DEFAULT_LEVEL_PATTERN: &str = r"^(\w+)\s*[:\[\]]\s*(.+)";

/// Pattern-based classifier. Group 1 is the level, group 2 the message.
///
/// When the pattern does not match, or group 1 is not a known level, the
/// keyword heuristic decides instead.
#[derive(Debug, Clone)]
pub struct RegexClassifier {
    pattern: Regex,
    fallback: KeywordClassifier,
}

impl RegexClassifier {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| Error::invalid_config(e.to_string()))?;
        if pattern.captures_len() < 3 {
            return Err(Error::invalid_config(format!(
                "level pattern '{}' needs two capture groups",
                pattern.as_str()
            )));
        }
        Ok(Self {
            pattern,
            fallback: KeywordClassifier,
        })
    }
}

impl Default for RegexClassifier {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_LEVEL_PATTERN).expect("default level pattern compiles"),
            fallback: KeywordClassifier,
        }
    }
}

impl LineClassifier for RegexClassifier {
    fn classify(&self, line: &str) -> Result<Classification> {
        let trimmed = line.trim();

        if let Some(caps) = self.pattern.captures(trimmed) {
            let level = caps.get(1).and_then(|m| Severity::from_label(m.as_str()));
            let message = caps.get(2).map(|m| m.as_str().trim());
            if let (Some(severity), Some(message)) = (level, message) {
                return Ok(Classification::new(severity, message));
            }
        }

        self.fallback.classify(trimmed)
    }
}

/// One JSON object per line, as emitted by structured loggers.
///
/// The level is read from `level` or `severity`, the message from `message`
/// or `msg`. Lines that are not JSON objects fail classification.
#[derive(Debug, Clone, Copy)]
pub struct JsonLineClassifier {
    unknown_level: Severity,
}

impl JsonLineClassifier {
    pub fn new() -> Self {
        Self {
            unknown_level: Severity::Info,
        }
    }

    /// Severity for objects whose level is missing or unrecognised.
    pub fn with_unknown_level(mut self, severity: Severity) -> Self {
        self.unknown_level = severity;
        self
    }
}

impl Default for JsonLineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineClassifier for JsonLineClassifier {
    fn classify(&self, line: &str) -> Result<Classification> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let object = value.as_object().ok_or_else(|| Error::Classification {
            message: "expected a JSON object".to_string(),
        })?;

        let severity = ["level", "severity"]
            .iter()
            .find_map(|key| object.get(*key).and_then(|v| v.as_str()))
            .and_then(Severity::from_label)
            .unwrap_or(self.unknown_level);

        let message = ["message", "msg"]
            .iter()
            .find_map(|key| object.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| line.to_string());

        Ok(Classification::new(severity, message))
    }
}
