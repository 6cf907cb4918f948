//! Server configuration.
//!
//! Configuration comes from the builder, a TOML document, or both: load a
//! file with [`ServerConfig::from_file`] and override fields through
//! [`ServerConfig::to_builder`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use trellis_server::ServerConfig;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("127.0.0.1:3000")
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "127.0.0.1:3000");
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_telemetry::Level;

/// Default HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default shutdown timeout in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

/// Environment variable consulted when no address is configured.
pub const PORT_ENV: &str = "PORT";

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    Read {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML document is malformed.
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// A field holds an unusable value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Server configuration.
///
/// Unset `http_addr` falls back to `0.0.0.0:$PORT`, then to
/// [`DEFAULT_HTTP_ADDR`]. A zero shutdown timeout waits for connections
/// without a deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    http_addr: Option<String>,
    server_name: Option<String>,
    shutdown_timeout_ms: u64,
    keep_alive: bool,
    max_connections: Option<usize>,
    log_level: Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: None,
            server_name: None,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            keep_alive: true,
            max_connections: None,
            log_level: Level::Info,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns a builder pre-filled with this configuration.
    #[must_use]
    pub fn to_builder(&self) -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: self.clone(),
        }
    }

    /// Parses a TOML document.
    ///
    /// ```rust
    /// use trellis_server::ServerConfig;
    ///
    /// let config = ServerConfig::from_toml_str(r#"
    ///     http_addr = "127.0.0.1:9000"
    ///     log_level = "debug"
    /// "#).unwrap();
    /// assert_eq!(config.http_addr(), "127.0.0.1:9000");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] for malformed input or unknown fields,
    /// and [`ConfigError::InvalidValue`] when validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise
    /// the errors of [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks that the address is `host:port` and the server name is a
    /// valid header value. Host names are not resolved here.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_addr.is_some() {
            check_host_port(&self.http_addr())
                .map_err(|reason| ConfigError::invalid("http_addr", reason))?;
        }
        if let Some(name) = &self.server_name {
            http::HeaderValue::from_str(name)
                .map_err(|e| ConfigError::invalid("server_name", e.to_string()))?;
        }
        if self.max_connections == Some(0) {
            return Err(ConfigError::invalid("max_connections", "must be at least 1"));
        }
        Ok(())
    }

    /// Returns the effective bind address.
    #[must_use]
    pub fn http_addr(&self) -> String {
        resolve_address(
            self.http_addr.as_deref(),
            std::env::var(PORT_ENV).ok().as_deref(),
        )
    }

    /// Returns the value sent in the `Server` response header.
    #[must_use]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Returns the graceful shutdown deadline; `None` waits indefinitely.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        (self.shutdown_timeout_ms > 0).then(|| Duration::from_millis(self.shutdown_timeout_ms))
    }

    /// Returns whether HTTP keep-alive is enabled.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Returns the connection cap, if any.
    #[must_use]
    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    /// Returns the level given to request loggers.
    #[must_use]
    pub fn log_level(&self) -> Level {
        self.log_level
    }
}

/// Picks the bind address: explicit value, then `PORT`, then the default.
///
/// A bare `:port` binds every interface.
///
/// ```rust
/// use trellis_server::config::resolve_address;
///
/// assert_eq!(resolve_address(Some("127.0.0.1:1"), Some("9")), "127.0.0.1:1");
/// assert_eq!(resolve_address(None, Some("9000")), "0.0.0.0:9000");
/// assert_eq!(resolve_address(Some(":7000"), None), "0.0.0.0:7000");
/// assert_eq!(resolve_address(None, None), "0.0.0.0:8080");
/// ```
#[must_use]
pub fn resolve_address(explicit: Option<&str>, port: Option<&str>) -> String {
    let addr = match (explicit, port) {
        (Some(addr), _) if !addr.is_empty() => addr.to_string(),
        (_, Some(port)) if !port.is_empty() => format!(":{port}"),
        _ => return DEFAULT_HTTP_ADDR.to_string(),
    };
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr,
    }
}

fn check_host_port(addr: &str) -> Result<(), String> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(format!("{addr:?} is missing a port"));
    };
    port.parse::<u16>().map_err(|_| format!("{port:?} is not a valid port"))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(format!("{addr:?} has no valid host"));
    }
    Ok(())
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bind address, e.g. `127.0.0.1:3000` or `:3000`.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = Some(addr.into());
        self
    }

    /// Sets the `Server` response header value.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = Some(name.into());
        self
    }

    /// Sets the graceful shutdown deadline. Zero waits indefinitely.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables HTTP keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive = enabled;
        self
    }

    /// Caps concurrent connections.
    #[must_use]
    pub fn max_connections(mut self, max: Option<usize>) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Sets the level given to request loggers.
    #[must_use]
    pub fn log_level(mut self, level: Level) -> Self {
        self.config.log_level = level;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(
            config.shutdown_timeout(),
            Some(Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS))
        );
        assert!(config.keep_alive());
        assert!(config.max_connections().is_none());
        assert!(config.server_name().is_none());
        assert_eq!(config.log_level(), Level::Info);
    }

    #[test]
    fn test_resolve_address() {
        assert_eq!(resolve_address(Some("10.0.0.1:80"), None), "10.0.0.1:80");
        assert_eq!(resolve_address(Some(""), Some("81")), "0.0.0.0:81");
        assert_eq!(resolve_address(None, Some("")), DEFAULT_HTTP_ADDR);
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::builder()
            .http_addr("127.0.0.1:9090")
            .server_name("trellis")
            .shutdown_timeout(Duration::from_millis(250))
            .keep_alive(false)
            .max_connections(Some(64))
            .log_level(Level::Debug)
            .build();

        assert_eq!(config.http_addr(), "127.0.0.1:9090");
        assert_eq!(config.server_name(), Some("trellis"));
        assert_eq!(config.shutdown_timeout(), Some(Duration::from_millis(250)));
        assert!(!config.keep_alive());
        assert_eq!(config.max_connections(), Some(64));
        assert_eq!(config.log_level(), Level::Debug);
    }

    #[test]
    fn test_zero_shutdown_timeout_waits_forever() {
        let config = ServerConfig::builder()
            .shutdown_timeout(Duration::ZERO)
            .build();
        assert!(config.shutdown_timeout().is_none());
    }

    #[test]
    fn test_toml_deserialization() {
        let config = ServerConfig::from_toml_str(
            r#"
            http_addr = "127.0.0.1:4000"
            server_name = "edge"
            shutdown_timeout_ms = 1500
            max_connections = 10
            log_level = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(config.http_addr(), "127.0.0.1:4000");
        assert_eq!(config.server_name(), Some("edge"));
        assert_eq!(config.shutdown_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.max_connections(), Some(10));
        assert_eq!(config.log_level(), Level::Warn);
        assert!(config.keep_alive());
    }

    #[test]
    fn test_toml_unknown_field() {
        let err = ServerConfig::from_toml_str("http2 = true").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_validation_errors() {
        let err = ServerConfig::from_toml_str(r#"http_addr = "nowhere""#).unwrap_err();
        assert!(err.to_string().contains("http_addr"));

        let err = ServerConfig::from_toml_str("max_connections = 0").unwrap_err();
        assert!(err.to_string().contains("max_connections"));

        let err = ServerConfig::from_toml_str(r#"http_addr = "localhost:http""#).unwrap_err();
        assert!(err.to_string().contains("http_addr"));
    }

    #[test]
    fn test_validation_accepts_host_names() {
        for addr in ["localhost:8080", "api.internal:80", "[::1]:9000", "127.0.0.1:0"] {
            let config = ServerConfig::builder().http_addr(addr).build();
            assert!(config.validate().is_ok(), "{addr} should validate");
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "http_addr = \"127.0.0.1:5000\"\nkeep_alive = false\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.http_addr(), "127.0.0.1:5000");
        assert!(!config.keep_alive());

        let missing = ServerConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn test_to_builder_overrides() {
        let base = ServerConfig::builder().server_name("a").build();
        let changed = base.to_builder().http_addr("127.0.0.1:1").build();

        assert_eq!(changed.server_name(), Some("a"));
        assert_eq!(changed.http_addr(), "127.0.0.1:1");
    }
}
