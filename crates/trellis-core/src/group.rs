//! Route groups.
//!
//! A [`RouteGroup`] carries before, after and terminal handlers that are
//! stamped onto every route registered through it. Changing the group
//! afterwards does not touch routes already registered.

use std::sync::Arc;

use http::Method;
use regex::Regex;
use trellis_router::RouteMethod;

use crate::chain::HandlerChain;
use crate::dispatcher::Dispatcher;
use crate::handler::{Handler, MainHandler, TerminalHandler};

/// Shared middleware for a set of routes.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trellis_core::{Dispatcher, FnHandler, FnMain};
///
/// let dispatcher = Dispatcher::new();
/// let api = dispatcher
///     .group()
///     .before(FnHandler::new("auth", |_ctx| Ok(())))
///     .after(FnHandler::new("audit", |_ctx| Ok(())));
///
/// api.get("/users", Arc::new(FnMain::new("list", |_ctx| Ok(()))))
///     .post("/users", Arc::new(FnMain::new("create", |_ctx| Ok(()))));
///
/// assert_eq!(dispatcher.route_count(), 2);
/// ```
#[derive(Clone)]
pub struct RouteGroup<'d> {
    dispatcher: &'d Dispatcher,
    before: Vec<Arc<dyn Handler>>,
    after: Vec<Arc<dyn Handler>>,
    terminal: Option<Arc<dyn TerminalHandler>>,
}

impl<'d> RouteGroup<'d> {
    pub(crate) fn new(dispatcher: &'d Dispatcher) -> Self {
        Self {
            dispatcher,
            before: Vec::new(),
            after: Vec::new(),
            terminal: None,
        }
    }

    /// Appends a before-handler.
    #[must_use]
    pub fn before(self, handler: impl Handler) -> Self {
        self.before_arc(Arc::new(handler))
    }

    /// Appends a shared before-handler.
    #[must_use]
    pub fn before_arc(mut self, handler: Arc<dyn Handler>) -> Self {
        self.before.push(handler);
        self
    }

    /// Puts a before-handler ahead of all others.
    #[must_use]
    pub fn first(mut self, handler: impl Handler) -> Self {
        self.before.insert(0, Arc::new(handler));
        self
    }

    /// Replaces the before-handlers.
    #[must_use]
    pub fn set_before(mut self, handlers: Vec<Arc<dyn Handler>>) -> Self {
        self.before = handlers;
        self
    }

    /// Appends an after-handler.
    #[must_use]
    pub fn after(self, handler: impl Handler) -> Self {
        self.after_arc(Arc::new(handler))
    }

    /// Appends a shared after-handler.
    #[must_use]
    pub fn after_arc(mut self, handler: Arc<dyn Handler>) -> Self {
        self.after.push(handler);
        self
    }

    /// Replaces the after-handlers.
    #[must_use]
    pub fn set_after(mut self, handlers: Vec<Arc<dyn Handler>>) -> Self {
        self.after = handlers;
        self
    }

    /// Sets the terminal handler.
    #[must_use]
    pub fn terminal(self, handler: impl TerminalHandler) -> Self {
        self.terminal_arc(Arc::new(handler))
    }

    /// Sets a shared terminal handler.
    #[must_use]
    pub fn terminal_arc(mut self, handler: Arc<dyn TerminalHandler>) -> Self {
        self.terminal = Some(handler);
        self
    }

    /// Returns the before-handler names in order.
    #[must_use]
    pub fn before_names(&self) -> Vec<&str> {
        self.before.iter().map(|h| h.name()).collect()
    }

    /// Returns the after-handler names in order.
    #[must_use]
    pub fn after_names(&self) -> Vec<&str> {
        self.after.iter().map(|h| h.name()).collect()
    }

    /// Builds the chain this group would register for `main`.
    #[must_use]
    pub fn chain(&self, main: Arc<dyn MainHandler>) -> HandlerChain {
        let mut chain = HandlerChain::from_arc(main);
        for handler in &self.before {
            chain = chain.before_arc(Arc::clone(handler));
        }
        for handler in &self.after {
            chain = chain.after_arc(Arc::clone(handler));
        }
        if let Some(terminal) = &self.terminal {
            chain = chain.terminal_arc(Arc::clone(terminal));
        }
        chain
    }

    /// Registers `main` at `path` for `method`.
    pub fn route(
        &self,
        method: impl Into<RouteMethod>,
        path: &str,
        main: Arc<dyn MainHandler>,
    ) -> &Self {
        let method = method.into();
        let chain = self.chain(main).with_id(format!("{method} {path}"));
        self.dispatcher.route(method, path, chain);
        self
    }

    /// Registers `main` in the regex fallback table.
    pub fn pattern(
        &self,
        method: impl Into<RouteMethod>,
        pattern: Regex,
        main: Arc<dyn MainHandler>,
    ) -> &Self {
        let method = method.into();
        let chain = self.chain(main).with_id(format!("{method} ~ {pattern}"));
        self.dispatcher.pattern(method, pattern, chain);
        self
    }

    /// Compiles `pattern` and registers `main` in the regex fallback table.
    ///
    /// # Errors
    ///
    /// Returns the compile error for an invalid pattern.
    pub fn pattern_str(
        &self,
        method: impl Into<RouteMethod>,
        pattern: &str,
        main: Arc<dyn MainHandler>,
    ) -> Result<&Self, regex::Error> {
        let compiled = Regex::new(pattern)?;
        Ok(self.pattern(method, compiled, main))
    }

    /// Registers a GET route.
    pub fn get(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::GET, path, main)
    }

    /// Registers a POST route.
    pub fn post(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::POST, path, main)
    }

    /// Registers a PUT route.
    pub fn put(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::PUT, path, main)
    }

    /// Registers a PATCH route.
    pub fn patch(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::PATCH, path, main)
    }

    /// Registers a DELETE route.
    pub fn delete(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::DELETE, path, main)
    }

    /// Registers a HEAD route.
    pub fn head(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::HEAD, path, main)
    }

    /// Registers an OPTIONS route.
    pub fn options(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::OPTIONS, path, main)
    }

    /// Registers a TRACE route.
    pub fn trace(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::TRACE, path, main)
    }

    /// Registers a CONNECT route.
    pub fn connect(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(Method::CONNECT, path, main)
    }

    /// Registers one route under both GET and POST.
    pub fn get_post(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(RouteMethod::GetPost, path, main)
    }

    /// Registers one route under both GET and HEAD.
    pub fn get_head(&self, path: &str, main: Arc<dyn MainHandler>) -> &Self {
        self.route(RouteMethod::GetHead, path, main)
    }
}
