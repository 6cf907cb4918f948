//! Segment trie router for Trellis.
//!
//! Routes are split into `/`-separated segments. Each segment is either a
//! literal (`users`) or a named parameter (`:id`). Literal and parameter
//! siblings may coexist at the same depth, so lookup explores every
//! candidate branch breadth-first and returns the first one that carries a
//! handler for the requested method.
//!
//! Paths that the trie cannot express are registered in a
//! [`PatternRouter`], a per-method list of regular expressions that is
//! consulted in registration order.
//!
//! # Example
//!
//! ```rust
//! use trellis_router::{Params, RouteMethod, Tree};
//! use http::Method;
//!
//! let mut tree = Tree::new();
//! tree.add(RouteMethod::GetPost, "/users/:id", "user");
//! tree.add(Method::GET, "/users/:id/posts/:post", "post");
//!
//! let mut params = Params::new();
//! assert_eq!(tree.find(&Method::POST, "/users/42", &mut params), Some(&"user"));
//! assert_eq!(params.get("id"), Some("42"));
//! ```
//!
//! # Layout
//!
//! ```text
//!                 "/"
//!                  │
//!          ┌───────┴───────┐
//!       "users"          "work"  [GET]
//!          │               │
//!        ":id"  [GET,POST] ":id"  [GET]
//!          │
//!       "posts"
//!          │
//!       ":post" [GET]
//! ```

mod method;
mod node;
mod params;
mod pattern;
mod tree;

pub use method::{MethodMap, RouteMethod};
pub use node::{Node, Segment};
pub use params::{Params, ParamsPool, PoolStats};
pub use pattern::PatternRouter;
pub use tree::{split_path, Tree};
