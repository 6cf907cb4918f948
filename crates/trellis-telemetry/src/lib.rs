//! Logging for Trellis.
//!
//! Two layers live here:
//!
//! - [`Logger`]: the per-request structured field logger handed to every
//!   handler. It accumulates key/value fields, has its own severity
//!   threshold, and emits through `tracing` so the events land wherever the
//!   process subscriber sends them.
//! - [`init_logging`]: installs that process subscriber (JSON, pretty or compact,
//!   filtered with `EnvFilter`).
//!
//! # Example
//!
//! ```rust
//! use trellis_telemetry::{Level, Logger};
//!
//! let mut logger = Logger::new(Level::Debug);
//! logger.add_field("request_id", "0191");
//! logger.debug("matched route");
//! assert!(logger.is_debug());
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logger;
pub mod logging;

pub use error::TelemetryError;
pub use logger::{Level, LogRecord, Logger};
pub use logging::{filter_floor, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
