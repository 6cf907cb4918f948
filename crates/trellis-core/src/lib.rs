//! # Trellis Core
//!
//! The request-dispatch pipeline of Trellis:
//!
//! - [`Dispatcher`] - resolves `(method, path)` through the segment trie,
//!   then the regex fallback table, and runs the matched chain
//! - [`HandlerChain`] - `init → before → main → after → join → terminal`
//!   with stop, abort and skip-main short-circuits
//! - [`RequestContext`] - per-request parameters, scratch values, flags,
//!   cancellation, fork-join [`TaskGroup`] and [`Logger`](trellis_telemetry::Logger)
//! - [`RouteGroup`] - stamps shared before/after/terminal handlers onto every
//!   route registered through it
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::{Dispatcher, FnMain};
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.group().get(
//!     "/users/:id",
//!     Arc::new(FnMain::new("user", |ctx| {
//!         let id = ctx.param("id").unwrap_or_default().to_string();
//!         ctx.write_str(&id);
//!         Ok(())
//!     })),
//! );
//! assert_eq!(dispatcher.route_count(), 1);
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod chain;
mod context;
pub mod cookie;
mod dispatcher;
mod error;
mod group;
mod handler;
mod tasks;

pub use chain::HandlerChain;
pub use context::{RequestContext, RequestContextBuilder, RequestId};
pub use cookie::{Cookies, SameSite, SetCookie};
pub use dispatcher::{Dispatcher, Gatekeeper, InitHook};
pub use error::{Error, Result};
pub use group::RouteGroup;
pub use handler::{BoxFuture, FnHandler, FnMain, FnTerminal, Handler, MainHandler, TerminalHandler};
pub use tasks::TaskGroup;

pub use trellis_router::{Params, RouteMethod};
pub use trellis_telemetry::{Level, Logger};
