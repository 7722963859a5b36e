use std::fmt;
use std::str;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Map, Value};
use crate::utils::{duration_millis, ts_millis};

/// An error used when parsing `Level` or `LogLevel`.
#[derive(Debug, Error)]
#[error("invalid level")]
pub struct ParseLevelError;

/// The severity of a captured exception or message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    /// Indicates very spammy debug information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// A warning.
    Warning,
    /// An error.
    Error,
    /// Similar to error but indicates a critical event that usually causes a shutdown.
    Fatal,
}

impl str::FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(string: &str) -> Result<Level, Self::Err> {
        Ok(match string {
            "debug" => Level::Debug,
            "info" | "log" => Level::Info,
            "warning" => Level::Warning,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            _ => return Err(ParseLevelError),
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Level::Debug => write!(f, "debug"),
            Level::Info => write!(f, "info"),
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
            Level::Fatal => write!(f, "fatal"),
        }
    }
}

impl_str_serde!(Level);

/// The severity of a structured log record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warn level.
    Warn,
    /// Error level.
    Error,
    /// Fatal level.
    Fatal,
}

impl str::FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(string: &str) -> Result<LogLevel, Self::Err> {
        Ok(match string {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "fatal" => LogLevel::Fatal,
            _ => return Err(ParseLevelError),
        })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Fatal => write!(f, "fatal"),
        }
    }
}

impl_str_serde!(LogLevel);

/// A structured log record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// The severity.
    pub level: LogLevel,
    /// The rendered message.
    pub body: String,
    /// When the record was created.
    #[serde(with = "ts_millis")]
    pub timestamp: SystemTime,
    /// Structured context.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

/// A single exception in a captured error chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    /// The type name of the error.
    #[serde(rename = "type")]
    pub ty: String,
    /// The rendered error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// An exception or message handed to the error tracking sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    /// The severity.
    pub level: Level,
    /// The message, for message captures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The error chain for exception captures, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception: Vec<Exception>,
    /// Extra context.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// Tags for grouping and search.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, String>,
    /// When the capture happened.
    #[serde(with = "ts_millis")]
    pub timestamp: SystemTime,
}

/// A finished performance span.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// The span operation, e.g. `http.client`.
    pub op: String,
    /// A human readable name.
    pub name: String,
    /// When the span started.
    #[serde(with = "ts_millis")]
    pub start: SystemTime,
    /// How long the span ran.
    #[serde(rename = "durationMs", with = "duration_millis")]
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_roundtrip() {
        assert_eq!("warning".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!(Level::Fatal.to_string(), "fatal");
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_default_level_is_info() {
        assert_eq!(Level::default(), Level::Info);
    }
}
