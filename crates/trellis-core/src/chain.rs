//! Handler chains.
//!
//! A chain runs its stages in a fixed order:
//!
//! ```text
//! init ─► before* ─► main ─► after* ─► join ─► terminal
//! ```
//!
//! - An error from any stage skips the rest of `init..after`.
//! - `stop` skips the rest of `before..after` without an error.
//! - `skip_main` skips only `main`.
//! - `abort` skips everything left, join and terminal included.

use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::{Handler, MainHandler, TerminalHandler};

/// An ordered before/main/after/terminal pipeline bound to one route.
///
/// Chains are immutable once registered; the dispatcher shares them
/// between requests behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use trellis_core::{FnHandler, FnMain, HandlerChain, RequestContext};
///
/// # tokio_test::block_on(async {
/// let chain = HandlerChain::new(FnMain::new("hello", |ctx| {
///     ctx.write_str("hello");
///     Ok(())
/// }))
/// .before(FnHandler::new("auth", |_ctx| Ok(())));
///
/// let mut ctx = RequestContext::mock();
/// chain.execute(&mut ctx).await.unwrap();
/// assert_eq!(ctx.response_body(), b"hello");
/// # });
/// ```
#[derive(Clone)]
pub struct HandlerChain {
    id: String,
    before: Vec<Arc<dyn Handler>>,
    after: Vec<Arc<dyn Handler>>,
    main: Arc<dyn MainHandler>,
    terminal: Option<Arc<dyn TerminalHandler>>,
}

impl HandlerChain {
    /// Creates a chain around `main` with no other stages.
    pub fn new(main: impl MainHandler) -> Self {
        Self::from_arc(Arc::new(main))
    }

    /// Creates a chain around a shared main handler.
    pub fn from_arc(main: Arc<dyn MainHandler>) -> Self {
        Self {
            id: String::new(),
            before: Vec::new(),
            after: Vec::new(),
            main,
            terminal: None,
        }
    }

    /// Sets the diagnostic identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
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

    /// Returns the diagnostic identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the main handler's name.
    #[must_use]
    pub fn main_name(&self) -> &str {
        self.main.name()
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

    /// Returns true if a terminal handler is set.
    #[must_use]
    pub fn has_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Runs `init`, the before-handlers, `main` and the after-handlers.
    ///
    /// Stops at the first error or once the context is stopped.
    pub async fn run(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        ctx.record_handler(self.main.name());
        self.main.init(ctx).await?;

        for handler in &self.before {
            ctx.record_handler(handler.name());
            handler.run(ctx).await?;
            if ctx.is_stopped() {
                return Ok(());
            }
        }

        if !ctx.is_main_skipped() {
            ctx.record_handler(self.main.name());
            self.main.run(ctx).await?;
            if ctx.is_stopped() {
                return Ok(());
            }
        }

        for handler in &self.after {
            ctx.record_handler(handler.name());
            handler.run(ctx).await?;
            if ctx.is_stopped() {
                return Ok(());
            }
        }

        Ok(())
    }

    /// Hands `err` to the terminal handler, or returns it unchanged when
    /// there is none.
    pub async fn run_terminal(
        &self,
        ctx: &mut RequestContext,
        err: Option<Error>,
    ) -> Result<(), Error> {
        match &self.terminal {
            Some(terminal) => {
                ctx.record_handler(terminal.name());
                terminal.run(ctx, err).await
            }
            None => err.map_or(Ok(()), Err),
        }
    }

    /// Runs the whole pipeline: stages, join, then terminal.
    ///
    /// After an abort the pending sub-tasks are not joined and the terminal
    /// handler is not invoked.
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        let result = self.run(ctx).await;
        if ctx.is_aborted() {
            return result;
        }

        let joined = ctx.wait_tasks().await;
        let err = Error::combine(result.err(), joined.err());
        self.run_terminal(ctx, err).await
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("id", &self.id)
            .field("before", &self.before_names())
            .field("main", &self.main.name())
            .field("after", &self.after_names())
            .field("terminal", &self.terminal.as_ref().map(|t| t.name()))
            .finish()
    }
}
