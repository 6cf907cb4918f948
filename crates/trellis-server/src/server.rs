//! HTTP server.
//!
//! [`Server`] binds a [`Dispatcher`] to a TCP listener with Hyper and
//! Tokio:
//!
//! - one task per connection, HTTP/1.1 with optional keep-alive
//! - request bodies are collected before dispatch
//! - an optional connection limit
//! - graceful shutdown: stop accepting, let open connections finish, then
//!   cancel the base token so remaining request work is abandoned
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trellis_core::FnMain;
//! use trellis_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::builder().http_addr(":8080").build());
//!     server.group().get(
//!         "/hello/:name",
//!         Arc::new(FnMain::new("hello", |ctx| {
//!             let name = ctx.param("name").unwrap_or("world").to_string();
//!             ctx.write_str(&format!("hello, {name}"));
//!             Ok(())
//!         })),
//!     );
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, SERVER};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use regex::Regex;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use trellis_core::{Dispatcher, Error, RequestContext, RouteGroup, RouteMethod};

use crate::basic_auth::BasicAuth;
use crate::config::{ConfigError, ServerConfig};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::static_files::{StaticFileHandler, StaticFiles};

/// Type alias for the HTTP response body.
pub type ResponseBody = Full<Bytes>;

/// Type alias for the HTTP response.
pub type HttpResponse = Response<ResponseBody>;

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The listen address could not be bound.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// Address that failed.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A static-file prefix did not compile into a route pattern.
    #[error("invalid static prefix: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The Trellis HTTP server.
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    base: CancellationToken,
}

impl Server {
    /// Creates a server with its own dispatcher and base lifetime.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_token(config, CancellationToken::new())
    }

    /// Creates a server whose base lifetime is `base`.
    ///
    /// Cancelling `base` stops accepting and drains like a shutdown signal;
    /// every request token derives from it.
    #[must_use]
    pub fn with_token(config: ServerConfig, base: CancellationToken) -> Self {
        let dispatcher = Dispatcher::with_token(base.clone());
        dispatcher.set_log_level(config.log_level());
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            base,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the base token every request token derives from.
    #[must_use]
    pub fn base_token(&self) -> &CancellationToken {
        &self.base
    }

    /// Starts a route group with no shared handlers.
    #[must_use]
    pub fn group(&self) -> RouteGroup<'_> {
        self.dispatcher.group()
    }

    /// Puts HTTP basic authentication in front of routing.
    pub fn set_basic_auth(&self, auth: BasicAuth) {
        tracing::debug!(
            users = auth.user_count(),
            realm = auth.realm_message(),
            "basic auth enabled"
        );
        self.dispatcher.set_gatekeeper(auth);
    }

    /// Sets a hook run on every request context after construction.
    pub fn set_init_hook<F>(&self, hook: F)
    where
        F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.dispatcher.set_init_hook(hook);
    }

    /// Serves `files` under `url_prefix` for GET and HEAD.
    pub fn static_files(&self, files: StaticFiles, url_prefix: &str) -> Result<(), ServerError> {
        self.static_files_with(&self.group(), files, url_prefix)
    }

    /// Serves `files` under `url_prefix` through `group`'s handlers.
    pub fn static_files_with(
        &self,
        group: &RouteGroup<'_>,
        files: StaticFiles,
        url_prefix: &str,
    ) -> Result<(), ServerError> {
        let handler = StaticFileHandler::new(files, url_prefix);
        let pattern = Regex::new(&format!("^/{}/.*", handler.url_prefix()))?;

        tracing::debug!(
            prefix = url_prefix,
            root = %handler.files().root().display(),
            "static files registered"
        );
        group.pattern(RouteMethod::GetHead, pattern, Arc::new(handler));
        Ok(())
    }

    /// Runs until SIGINT, SIGTERM or SIGQUIT, or until the base token is
    /// cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals(CancellationToken::new());
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and runs until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        self.config.validate()?;
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Accepts connections from `listener` until `trigger` fires or the
    /// base token is cancelled.
    pub async fn serve(
        self,
        listener: TcpListener,
        trigger: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::from_token(self.base.child_token());
        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = trigger.recv() => shutdown.trigger(),
                    () = shutdown.recv() => {}
                }
            });
        }

        let local_addr = listener.local_addr()?;
        tracing::info!("Server listening on {}", local_addr);
        self.dispatcher.log_routes();

        let server_name = self
            .config
            .server_name()
            .and_then(|name| HeaderValue::from_str(name).ok());
        let keep_alive = self.config.keep_alive();
        let limit = self
            .config
            .max_connections()
            .map(|max| Arc::new(Semaphore::new(max)));
        let tracker = ConnectionTracker::new();

        loop {
            let permit = match &limit {
                Some(limit) => tokio::select! {
                    permit = Arc::clone(limit).acquire_owned() => permit.ok(),
                    () = shutdown.recv() => break,
                },
                None => None,
            };

            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, remote_addr)) => {
                        let connection = Connection {
                            dispatcher: Arc::clone(&self.dispatcher),
                            server_name: server_name.clone(),
                            keep_alive,
                        };
                        let guard = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = connection.serve(stream, remote_addr, shutdown).await {
                                tracing::debug!("Connection error from {}: {}", remote_addr, e);
                            }
                            drop(permit);
                            drop(guard);
                        });
                    }
                    Err(e) => tracing::error!("Failed to accept connection: {}", e),
                },
                () = shutdown.recv() => break,
            }
        }

        tracing::info!(
            "Shutdown signal received, waiting for {} connections",
            tracker.active_connections()
        );

        match self.config.shutdown_timeout() {
            Some(timeout) => {
                if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
                    tracing::warn!(
                        "Shutdown timeout reached, {} connections still active",
                        tracker.active_connections()
                    );
                }
            }
            None => tracker.wait_idle().await,
        }

        self.base.cancel();
        tracing::info!("Server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("routes", &self.dispatcher.route_count())
            .finish_non_exhaustive()
    }
}

struct Connection {
    dispatcher: Arc<Dispatcher>,
    server_name: Option<HeaderValue>,
    keep_alive: bool,
}

impl Connection {
    async fn serve(
        self,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let state = Arc::new(self);
        let keep_alive = state.keep_alive;

        let service = service_fn(move |req: Request<Incoming>| {
            let state = Arc::clone(&state);
            async move { Ok::<_, Infallible>(state.handle_request(req).await) }
        });

        let conn = http1::Builder::new()
            .keep_alive(keep_alive)
            .serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                tracing::debug!("Connection from {} closing for shutdown", remote_addr);
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> HttpResponse {
        let (parts, body) = req.into_parts();
        let mut response = match body.collect().await {
            Ok(collected) => {
                let request = Request::from_parts(parts, collected.to_bytes());
                self.dispatcher.handle(request).await.map(Full::new)
            }
            Err(e) => {
                tracing::warn!("Failed to collect request body: {}", e);
                let mut response = Response::new(Full::new(Bytes::from_static(b"bad request")));
                *response.status_mut() = StatusCode::BAD_REQUEST;
                response
            }
        };

        if let Some(name) = &self.server_name {
            response.headers_mut().insert(SERVER, name.clone());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trellis_core::FnMain;

    #[test]
    fn test_server_new_applies_log_level() {
        let config = ServerConfig::builder()
            .http_addr("127.0.0.1:0")
            .log_level(trellis_core::Level::Debug)
            .build();
        let server = Server::new(config);
        assert_eq!(server.dispatcher().log_level(), trellis_core::Level::Debug);
        assert_eq!(server.config().http_addr(), "127.0.0.1:0");
    }

    #[test]
    fn test_static_files_registers_pattern() {
        let server = Server::new(ServerConfig::default());
        server
            .static_files(StaticFiles::new("."), "/assets/")
            .unwrap();

        assert_eq!(server.dispatcher().routes(), vec!["GET+HEAD ~ ^/assets/.*"]);
    }

    #[test]
    fn test_static_files_rejects_bad_prefix() {
        let server = Server::new(ServerConfig::default());
        let err = server
            .static_files(StaticFiles::new("."), "/broken(")
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidPattern(_)));
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind to 127.0.0.1:80: denied");
    }

    #[tokio::test]
    async fn test_run_invalid_address() {
        let server = Server::new(ServerConfig::builder().http_addr("not-an-address").build());
        let result = server.run_with_shutdown(ShutdownSignal::new()).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_and_shutdown() {
        let server = Server::new(
            ServerConfig::builder()
                .http_addr("127.0.0.1:0")
                .shutdown_timeout(Duration::from_millis(100))
                .build(),
        );
        server.group().get(
            "/",
            Arc::new(FnMain::new("root", |_ctx: &mut RequestContext| Ok(()))),
        );
        let base = server.base_token().clone();

        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let stopped = server.run_with_shutdown(shutdown);
        let result = tokio::time::timeout(Duration::from_secs(5), stopped)
            .await
            .expect("server should stop");
        assert!(result.is_ok());
        assert!(base.is_cancelled());
    }
}
