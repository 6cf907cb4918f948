//! Handler traits.
//!
//! A chain is built from three kinds of handler:
//!
//! - [`Handler`]: a before or after stage.
//! - [`MainHandler`]: the single main stage. Its [`init`](MainHandler::init)
//!   runs before every other stage.
//! - [`TerminalHandler`]: runs last and receives the pipeline's error.
//!
//! Handlers are async and borrow the [`RequestContext`] mutably. The `Fn*`
//! wrappers adapt plain closures for the common synchronous case.

use std::future::Future;
use std::pin::Pin;

use crate::context::RequestContext;
use crate::error::Error;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A before or after stage.
///
/// # Example
///
/// ```
/// use trellis_core::{BoxFuture, Error, Handler, RequestContext};
///
/// struct RequireJson;
///
/// impl Handler for RequireJson {
///     fn name(&self) -> &str {
///         "require-json"
///     }
///
///     fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>> {
///         Box::pin(async move {
///             if ctx.header("content-type") != Some("application/json") {
///                 ctx.stop();
///             }
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Returns the name recorded in the debug handler trail.
    fn name(&self) -> &str;

    /// Runs the stage.
    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>;
}

/// The main stage of a chain.
pub trait MainHandler: Send + Sync + 'static {
    /// Returns the name recorded in the debug handler trail.
    fn name(&self) -> &str;

    /// Prepares the context. Runs before any before-handler.
    fn init<'a>(&'a self, _ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }

    /// Runs the stage.
    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>;
}

/// The final stage, invoked with the pipeline's accumulated error.
pub trait TerminalHandler: Send + Sync + 'static {
    /// Returns the name recorded in the debug handler trail.
    fn name(&self) -> &str;

    /// Runs the stage. The returned result is the chain's final outcome.
    fn run<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        err: Option<Error>,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

/// A [`Handler`] built from a synchronous closure.
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
{
    /// Wraps `func` under `name`.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>> {
        let result = (self.func)(ctx);
        Box::pin(async move { result })
    }
}

/// A [`MainHandler`] built from a synchronous closure. `init` is a no-op.
pub struct FnMain<F> {
    name: String,
    func: F,
}

impl<F> FnMain<F>
where
    F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
{
    /// Wraps `func` under `name`.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> MainHandler for FnMain<F>
where
    F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>> {
        let result = (self.func)(ctx);
        Box::pin(async move { result })
    }
}

/// A [`TerminalHandler`] built from a synchronous closure.
pub struct FnTerminal<F> {
    name: String,
    func: F,
}

impl<F> FnTerminal<F>
where
    F: Fn(&mut RequestContext, Option<Error>) -> Result<(), Error> + Send + Sync + 'static,
{
    /// Wraps `func` under `name`.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> TerminalHandler for FnTerminal<F>
where
    F: Fn(&mut RequestContext, Option<Error>) -> Result<(), Error> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        err: Option<Error>,
    ) -> BoxFuture<'a, Result<(), Error>> {
        let result = (self.func)(ctx, err);
        Box::pin(async move { result })
    }
}
