//! Per-request structured logger.
//!
//! A [`Logger`] carries a severity threshold and a set of fields. Leveled
//! calls below the threshold are no-ops; the rest are forwarded to
//! `tracing` with the fields serialized as JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TelemetryError;

/// Log severity, ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Unrecoverable conditions.
    Fatal,
    /// Failed operations.
    Error,
    /// Suspicious but tolerated conditions.
    Warn,
    /// Normal operational messages.
    #[default]
    Info,
    /// Diagnostic detail, including the handler-name trail.
    Debug,
    /// Everything.
    Trace,
}

impl Level {
    /// Returns the lowercase name of the level.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Returns true if a message at `self` passes a `threshold`.
    #[must_use]
    pub fn enabled_at(self, threshold: Level) -> bool {
        self <= threshold
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" | "panic" => Ok(Self::Fatal),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(TelemetryError::UnknownLevel(other.to_string())),
        }
    }
}

/// A rendered log event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Severity of the event.
    pub level: Level,
    /// Human-readable message.
    pub message: String,
    /// Accumulated fields at the time of the call.
    pub fields: BTreeMap<String, Value>,
}

impl LogRecord {
    /// Serializes the fields, level and message as one JSON object.
    #[must_use]
    pub fn to_json(&self) -> String {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        object.insert("level".to_string(), Value::from(self.level.as_str()));
        object.insert("message".to_string(), Value::from(self.message.clone()));
        Value::Object(object).to_string()
    }
}

/// Structured field logger with a severity threshold.
///
/// Cloning a logger forks its fields: later additions on either copy are
/// not seen by the other.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    level: Level,
    fields: BTreeMap<String, Value>,
}

impl Logger {
    /// Creates a logger with the given threshold and no fields.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self {
            level,
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field and returns the logger.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_field(key, value);
        self
    }

    /// Adds or replaces a field.
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Adds a field only when the threshold is at least [`Level::Debug`].
    pub fn add_debug(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if self.is_debug() {
            self.add_field(key, value);
        }
    }

    /// Returns the value of a field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns all fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Sets the severity threshold.
    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    /// Returns the severity threshold.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Returns true if the threshold is at least [`Level::Debug`].
    #[must_use]
    pub fn is_debug(&self) -> bool {
        Level::Debug.enabled_at(self.level)
    }

    /// Renders an event, or `None` when `level` is below the threshold.
    #[must_use]
    pub fn record(&self, level: Level, message: impl fmt::Display) -> Option<LogRecord> {
        level.enabled_at(self.level).then(|| LogRecord {
            level,
            message: message.to_string(),
            fields: self.fields.clone(),
        })
    }

    /// Emits an event at `level`.
    pub fn log(&self, level: Level, message: impl fmt::Display) {
        let Some(record) = self.record(level, message) else {
            return;
        };
        let fields = Value::Object(record.fields.into_iter().collect()).to_string();
        let message = record.message;
        match level {
            Level::Fatal => tracing::error!(fatal = true, fields = %fields, "{message}"),
            Level::Error => tracing::error!(fields = %fields, "{message}"),
            Level::Warn => tracing::warn!(fields = %fields, "{message}"),
            Level::Info => tracing::info!(fields = %fields, "{message}"),
            Level::Debug => tracing::debug!(fields = %fields, "{message}"),
            Level::Trace => tracing::trace!(fields = %fields, "{message}"),
        }
    }

    /// Emits at [`Level::Fatal`]. The process is not terminated.
    pub fn fatal(&self, message: impl fmt::Display) {
        self.log(Level::Fatal, message);
    }

    /// Emits at [`Level::Error`].
    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }

    /// Emits at [`Level::Warn`].
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, message);
    }

    /// Emits at [`Level::Info`].
    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    /// Emits at [`Level::Debug`].
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }

    /// Emits at [`Level::Trace`].
    pub fn trace(&self, message: impl fmt::Display) {
        self.log(Level::Trace, message);
    }
}
