//! Process-wide `tracing` subscriber setup.
//!
//! The filter is built from a [`Level`] floor plus optional per-target
//! directives, so the same threshold that drives [`Logger`](crate::Logger)
//! also drives the subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development().directive("hyper=warn"))?;
//! tracing::info!(route = "/users/:id", "route registered");
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::logger::Level;
use crate::TelemetryResult;

/// Output encoding of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Install nothing when false.
    pub enabled: bool,
    /// Floor for every target without a directive of its own.
    pub level: Level,
    /// Extra `EnvFilter` directives such as `hyper=warn`.
    pub directives: Vec<String>,
    /// Output encoding.
    pub format: LogFormat,
    /// Emit span open/close events.
    pub span_events: bool,
    /// Attach file and line to each event.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Pretty output at debug, with span events and source locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: Level::Debug,
            directives: Vec::new(),
            format: LogFormat::Pretty,
            span_events: true,
            source_location: true,
        }
    }

    /// JSON output at info.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: Level::Info,
            directives: Vec::new(),
            format: LogFormat::Json,
            span_events: false,
            source_location: false,
        }
    }

    /// Sets the floor level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Appends a per-target directive.
    #[must_use]
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Sets the output encoding.
    #[must_use]
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Builds the `EnvFilter` for this configuration.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::LoggingInit` if a directive does not parse.
    pub fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut joined = filter_floor(self.level).to_string();
        for directive in &self.directives {
            joined.push(',');
            joined.push_str(directive);
        }
        EnvFilter::try_new(&joined)
            .map_err(|e| TelemetryError::LoggingInit(format!("bad filter {joined:?}: {e}")))
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Maps a [`Level`] to the `tracing` level name used in filters.
///
/// `tracing` has no fatal level; fatal messages are emitted at error.
#[must_use]
pub fn filter_floor(level: Level) -> &'static str {
    match level {
        Level::Fatal | Level::Error => "error",
        Level::Warn => "warn",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = config.filter()?;
    let base = tracing_subscriber::fmt::layer()
        .with_span_events(config.span_events())
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let layer = match config.format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
