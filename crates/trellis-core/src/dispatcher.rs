//! Request dispatch.
//!
//! The [`Dispatcher`] owns the route tables and is the single entry point
//! the network layer calls for every request. Lookup tries the segment
//! trie first and falls back to the regex table.
//!
//! Registration takes one write lock over both tables and every lookup
//! takes a read lock, so a lookup never observes a half-built branch.
//! Tables are expected to be filled before traffic starts.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{Method, Request, Response, StatusCode};
use parking_lot::RwLock;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use trellis_router::{Params, PatternRouter, RouteMethod, Tree};
use trellis_telemetry::Level;

use crate::chain::HandlerChain;
use crate::context::RequestContext;
use crate::error::Error;
use crate::group::RouteGroup;

/// Decides whether a request may proceed to routing.
///
/// Implemented by authentication layers such as HTTP basic auth.
pub trait Gatekeeper: Send + Sync + 'static {
    /// Returns true if `request` must pass [`check`](Self::check).
    fn should_check(&self, request: &Request<Bytes>) -> bool;

    /// Admits or rejects `request`.
    ///
    /// Rejection is reported as [`Error::AuthDenied`]; its challenge is sent
    /// back in `WWW-Authenticate` with a `401`.
    fn check(&self, request: &Request<Bytes>) -> Result<(), Error>;
}

/// Hook run on every context after construction and before the chain.
pub type InitHook = Arc<dyn Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync>;

#[derive(Default)]
struct Routes {
    tree: Tree<Arc<HandlerChain>>,
    patterns: PatternRouter<Arc<HandlerChain>>,
    pattern_list: Vec<(RouteMethod, String)>,
}

/// Route tables plus the per-request pipeline.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use http::{Request, StatusCode};
/// use trellis_core::{Dispatcher, FnMain};
///
/// # tokio_test::block_on(async {
/// let dispatcher = Dispatcher::new();
/// dispatcher.group().get(
///     "/ping",
///     Arc::new(FnMain::new("ping", |ctx| {
///         ctx.write_str("pong");
///         Ok(())
///     })),
/// );
///
/// let request = Request::get("/ping").body(Bytes::new()).unwrap();
/// let response = dispatcher.handle(request).await;
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.body().as_ref(), b"pong");
/// # });
/// ```
pub struct Dispatcher {
    routes: RwLock<Routes>,
    gatekeeper: RwLock<Option<Arc<dyn Gatekeeper>>>,
    init_hook: RwLock<Option<InitHook>>,
    level: RwLock<Level>,
    base: CancellationToken,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with its own base token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Creates a dispatcher whose request tokens derive from `base`.
    #[must_use]
    pub fn with_token(base: CancellationToken) -> Self {
        Self {
            routes: RwLock::new(Routes::default()),
            gatekeeper: RwLock::new(None),
            init_hook: RwLock::new(None),
            level: RwLock::new(Level::Info),
            base,
        }
    }

    /// Returns the base token. Cancelling it reaches every in-flight request.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.base
    }

    /// Installs the gatekeeper consulted before routing.
    pub fn set_gatekeeper(&self, gatekeeper: impl Gatekeeper) {
        *self.gatekeeper.write() = Some(Arc::new(gatekeeper));
    }

    /// Installs the per-request init hook.
    pub fn set_init_hook<F>(&self, hook: F)
    where
        F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
    {
        *self.init_hook.write() = Some(Arc::new(hook));
    }

    /// Sets the level given to every request logger.
    pub fn set_log_level(&self, level: Level) {
        *self.level.write() = level;
    }

    /// Returns the level given to every request logger.
    #[must_use]
    pub fn log_level(&self) -> Level {
        *self.level.read()
    }

    /// Returns a route group with no shared handlers.
    #[must_use]
    pub fn group(&self) -> RouteGroup<'_> {
        RouteGroup::new(self)
    }

    /// Registers `chain` in the trie.
    pub fn route(&self, method: impl Into<RouteMethod>, path: &str, chain: HandlerChain) {
        self.routes.write().tree.add(method, path, Arc::new(chain));
    }

    /// Appends `chain` to the regex fallback table.
    pub fn pattern(&self, method: impl Into<RouteMethod>, pattern: Regex, chain: HandlerChain) {
        let method = method.into();
        let mut routes = self.routes.write();
        routes
            .pattern_list
            .push((method.clone(), pattern.as_str().to_string()));
        routes.patterns.add(method, pattern, Arc::new(chain));
    }

    /// Resolves `(method, path)`: trie first, then regex table.
    ///
    /// `params` receives the path parameters of a trie match and is left
    /// empty for a regex match.
    pub fn find(
        &self,
        method: &Method,
        path: &str,
        params: &mut Params,
    ) -> Option<Arc<HandlerChain>> {
        let routes = self.routes.read();
        if let Some(chain) = routes.tree.find(method, path, params) {
            return Some(Arc::clone(chain));
        }
        params.reset();
        routes.patterns.find(method, path).map(Arc::clone)
    }

    /// Returns the number of registrations in both tables.
    #[must_use]
    pub fn route_count(&self) -> usize {
        let routes = self.routes.read();
        routes.tree.len() + routes.patterns.len()
    }

    /// Lists registrations as `METHOD path` lines; regex routes are marked
    /// with `~`.
    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        let routes = self.routes.read();
        routes
            .tree
            .routes()
            .iter()
            .map(|(method, path)| format!("{method} {path}"))
            .chain(
                routes
                    .pattern_list
                    .iter()
                    .map(|(method, pattern)| format!("{method} ~ {pattern}")),
            )
            .collect()
    }

    /// Emits the route table at debug level.
    pub fn log_routes(&self) {
        for route in self.routes() {
            tracing::debug!(route = %route, "registered route");
        }
    }

    /// Runs the full pipeline for one request and returns the response.
    ///
    /// - A gatekeeper rejection yields `401` with its challenge.
    /// - No route yields `404` with body `not found`.
    /// - A context or init-hook failure yields `400`.
    /// - A chain error is logged; the response stays as the handlers left it.
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let gatekeeper = self.gatekeeper.read().clone();
        if let Some(gatekeeper) = gatekeeper {
            if gatekeeper.should_check(&request) {
                if let Err(err) = gatekeeper.check(&request) {
                    tracing::warn!(
                        method = %method,
                        path = %path,
                        error = %err,
                        "request rejected"
                    );
                    return error_response(&err);
                }
            }
        }

        let mut params = Params::new();
        let Some(chain) = self.find(&method, &path, &mut params) else {
            tracing::debug!(method = %method, path = %path, "route not found");
            return error_response(&Error::not_found(method, path));
        };

        let mut ctx = match RequestContext::new(request, params, &self.base) {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    error = %err,
                    "failed to build request context"
                );
                return error_response(&err);
            }
        };
        ctx.set_log_level(self.log_level());

        let hook = self.init_hook.read().clone();
        if let Some(hook) = hook {
            if let Err(err) = hook(&mut ctx) {
                ctx.logger().warn(format!("init hook failed: {err}"));
                return error_response(&Error::context_init(err.to_string()));
            }
        }

        let result = chain.execute(&mut ctx).await;

        if let Some(names) = ctx.called_handlers().map(<[String]>::to_vec) {
            ctx.logger_mut().add_field("handlers", names);
        }
        if let Err(err) = &result {
            ctx.logger().error(format!("handler chain failed: {err}"));
        }

        let response = ctx.take_response();
        ctx.logger().debug(format_args!(
            "request completed status={} elapsed_ms={}",
            response.status().as_u16(),
            started.elapsed().as_millis()
        ));
        response
    }
}

fn error_response(err: &Error) -> Response<Bytes> {
    let status = err.status_code();
    let body = match err {
        Error::RouteNotFound { .. } => "not found",
        Error::AuthDenied { .. } => "",
        _ => status.canonical_reason().unwrap_or("error"),
    };

    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    if !body.is_empty() {
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
    }
    if let Error::AuthDenied { challenge } = err {
        match HeaderValue::from_str(challenge) {
            Ok(value) => {
                response.headers_mut().insert(WWW_AUTHENTICATE, value);
            }
            Err(e) => tracing::warn!(error = %e, "invalid authentication challenge"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnMain;

    fn text(body: &'static str) -> HandlerChain {
        HandlerChain::new(FnMain::new(body, move |ctx: &mut RequestContext| {
            ctx.write_str(body);
            Ok(())
        }))
    }

    fn get(path: &str) -> Request<Bytes> {
        Request::get(path).body(Bytes::new()).unwrap()
    }

    struct DenyAll;

    impl Gatekeeper for DenyAll {
        fn should_check(&self, request: &Request<Bytes>) -> bool {
            request.uri().path() != "/public"
        }

        fn check(&self, _request: &Request<Bytes>) -> Result<(), Error> {
            Err(Error::AuthDenied {
                challenge: "Basic realm=\"test\"".to_string(),
            })
        }
    }

    #[test]
    fn test_trie_wins_over_pattern() {
        let dispatcher = Dispatcher::new();
        dispatcher.route(Method::GET, "/static/app.js", text("trie"));
        dispatcher.pattern(Method::GET, Regex::new("^/static/.*").unwrap(), text("pattern"));

        let mut params = Params::new();
        let chain = dispatcher
            .find(&Method::GET, "/static/app.js", &mut params)
            .unwrap();
        assert_eq!(chain.main_name(), "trie");

        let chain = dispatcher
            .find(&Method::GET, "/static/other.js", &mut params)
            .unwrap();
        assert_eq!(chain.main_name(), "pattern");
        assert!(params.is_empty());

        assert!(dispatcher.find(&Method::POST, "/static/x", &mut params).is_none());
    }

    #[test]
    fn test_route_listing() {
        let dispatcher = Dispatcher::new();
        dispatcher.route(RouteMethod::GetPost, "/login", text("login"));
        dispatcher.pattern(RouteMethod::GetHead, Regex::new("^/assets/.*").unwrap(), text("a"));

        assert_eq!(dispatcher.route_count(), 2);
        assert_eq!(
            dispatcher.routes(),
            vec!["GET+POST /login".to_string(), "GET+HEAD ~ ^/assets/.*".to_string()]
        );
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let dispatcher = Dispatcher::new();
        let response = dispatcher.handle(get("/missing")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"not found");
    }

    #[tokio::test]
    async fn test_gatekeeper_rejects_before_routing() {
        let dispatcher = Dispatcher::new();
        dispatcher.route(Method::GET, "/private", text("secret"));
        dispatcher.route(Method::GET, "/public", text("hello"));
        dispatcher.set_gatekeeper(DenyAll);

        let denied = dispatcher.handle(get("/private")).await;
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(denied.headers()[WWW_AUTHENTICATE], "Basic realm=\"test\"");
        assert!(denied.body().is_empty());

        let open = dispatcher.handle(get("/public")).await;
        assert_eq!(open.status(), StatusCode::OK);
        assert_eq!(open.body().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_init_hook_failure_is_bad_request() {
        let dispatcher = Dispatcher::new();
        dispatcher.route(Method::GET, "/", text("root"));
        dispatcher.set_init_hook(|ctx| {
            if ctx.header("x-tenant").is_none() {
                return Err(Error::handler("missing tenant"));
            }
            Ok(())
        });

        let response = dispatcher.handle(get("/")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::get("/")
            .header("x-tenant", "acme")
            .body(Bytes::new())
            .unwrap();
        let response = dispatcher.handle(request).await;
        assert_eq!(response.body().as_ref(), b"root");
    }

    #[test]
    fn test_log_level_round_trip() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.log_level(), Level::Info);
        dispatcher.set_log_level(Level::Debug);
        assert_eq!(dispatcher.log_level(), Level::Debug);
    }

    #[test]
    fn test_base_token_is_shared() {
        let base = CancellationToken::new();
        let dispatcher = Dispatcher::with_token(base.clone());
        base.cancel();
        assert!(dispatcher.token().is_cancelled());
    }
}
