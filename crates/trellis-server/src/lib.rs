//! # Trellis Server
//!
//! The network side of Trellis:
//!
//! - [`Server`] - HTTP/1.1 accept loop over Hyper and Tokio feeding a
//!   [`Dispatcher`](trellis_core::Dispatcher)
//! - [`ServerConfig`] - bind address, server name, shutdown timeout and
//!   connection limits, loadable from TOML
//! - [`ShutdownSignal`] - OS-signal or programmatic graceful shutdown
//! - [`BasicAuth`] - HTTP basic authentication checked before routing
//! - [`StaticFiles`] - directory serving with conditional and range
//!   requests
//!
//! ## Example
//!
//! ```rust,no_run
//! use trellis_server::{BasicAuth, Server, ServerConfig, StaticFiles};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::from_file("trellis.toml")?);
//!     server.set_basic_auth(BasicAuth::new().user("admin", "s3cret"));
//!     server.static_files(StaticFiles::new("./public"), "/static")?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod basic_auth;
pub mod config;
mod server;
pub mod shutdown;
mod static_files;

pub use basic_auth::{BasicAuth, DEFAULT_CHARSET, DEFAULT_REALM};
pub use config::{ConfigError, ServerConfig, ServerConfigBuilder};
pub use server::{HttpResponse, ResponseBody, Server, ServerError};
pub use shutdown::ShutdownSignal;
pub use static_files::{StaticFileError, StaticFileHandler, StaticFiles, DEFAULT_INDEX};
