//! The routing trie.
//!
//! [`Tree::find`] walks the trie breadth-first. Every frontier entry owns
//! its own [`Params`] accumulator taken from the tree's [`ParamsPool`]; all
//! of them go back to the pool when the lookup ends, whichever branch won.

use std::collections::VecDeque;
use std::fmt;

use http::Method;

use crate::method::RouteMethod;
use crate::node::{Node, Segment};
use crate::params::{Params, ParamsPool};

/// Normalizes `path` and splits it into segments.
///
/// Surrounding whitespace and slashes are trimmed and the result is
/// re-prefixed with `/`, which becomes the first segment.
///
/// # Example
///
/// ```rust
/// use trellis_router::split_path;
///
/// assert_eq!(split_path(""), vec!["/"]);
/// assert_eq!(split_path("/a/b/c/"), vec!["/", "a", "b", "c"]);
/// ```
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim().trim_matches('/').trim();
    let mut segs = vec!["/"];
    if !trimmed.is_empty() {
        segs.extend(trimmed.split('/'));
    }
    segs
}

/// A segment trie mapping `(method, path)` to values.
///
/// # Example
///
/// ```rust
/// use trellis_router::{Params, Tree};
/// use http::Method;
///
/// let mut tree = Tree::new();
/// tree.add(Method::GET, "/work", "list");
/// tree.add(Method::GET, "/work/:id", "item");
///
/// let mut params = Params::new();
/// assert_eq!(tree.find(&Method::GET, "/work", &mut params), Some(&"list"));
/// assert!(params.is_empty());
///
/// assert_eq!(tree.find(&Method::GET, "/work/99", &mut params), Some(&"item"));
/// assert_eq!(params.get("id"), Some("99"));
/// ```
#[derive(Debug, Clone)]
pub struct Tree<V> {
    root: Node<V>,
    pool: ParamsPool,
    routes: Vec<(RouteMethod, String)>,
}

impl<V: Clone> Default for Tree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> Tree<V> {
    /// Creates an empty trie with a private accumulator pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool(ParamsPool::default())
    }

    /// Creates an empty trie that draws accumulators from `pool`.
    #[must_use]
    pub fn with_pool(pool: ParamsPool) -> Self {
        Self {
            root: Node::root(),
            pool,
            routes: Vec::new(),
        }
    }

    /// Registers `value` for `method` at `path`.
    ///
    /// Registering the same method and path twice replaces the earlier
    /// value.
    pub fn add(&mut self, method: impl Into<RouteMethod>, path: &str, value: V) {
        let method = method.into();
        let methods = method.expand();
        let segs = split_path(path);

        if segs.len() == 1 {
            self.root.set_handlers(&methods, &value);
        } else {
            self.root.insert(&segs[1..], &methods, &value);
        }
        self.routes.push((method, path.to_string()));
    }

    /// Looks up the value registered for `method` at `path`.
    ///
    /// `params` is cleared and then filled with the parameters of the
    /// winning branch, in traversal order.
    pub fn find(&self, method: &Method, path: &str, params: &mut Params) -> Option<&V> {
        params.reset();
        let segs = split_path(path);

        if segs.len() == 1 {
            return self.root.handler(method);
        }

        let mut arena: Vec<Params> = vec![self.pool.acquire()];
        let mut frontier: VecDeque<(&Node<V>, usize, usize)> = VecDeque::new();
        frontier.push_back((&self.root, 0, 0));

        let mut found = None;
        while let Some((node, depth, slot)) = frontier.pop_front() {
            let seg = segs[depth];
            match node.segment() {
                Segment::Param(name) => arena[slot].push(name.as_str(), seg),
                Segment::Literal(text) => {
                    if text != seg {
                        continue;
                    }
                }
            }

            if depth + 1 == segs.len() {
                if let Some(value) = node.handler(method) {
                    params.copy_from(&arena[slot]);
                    found = Some(value);
                    break;
                }
                continue;
            }

            let next = segs[depth + 1];
            for child in node.children() {
                if child.segment().accepts(next) {
                    let mut branch = self.pool.acquire();
                    branch.copy_from(&arena[slot]);
                    arena.push(branch);
                    frontier.push_back((child, depth + 1, arena.len() - 1));
                }
            }
        }

        for branch in arena {
            self.pool.release(branch);
        }
        found
    }

    /// Returns the registrations in the order they were added.
    #[must_use]
    pub fn routes(&self) -> &[(RouteMethod, String)] {
        &self.routes
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the root node.
    #[must_use]
    pub fn root(&self) -> &Node<V> {
        &self.root
    }

    /// Returns the accumulator pool used by lookups.
    #[must_use]
    pub fn pool(&self) -> &ParamsPool {
        &self.pool
    }
}

impl<V> fmt::Display for Tree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn walk<V>(node: &Node<V>, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let label = match node.segment() {
                Segment::Literal(text) => text.clone(),
                Segment::Param(name) => format!(":{name}"),
            };
            let methods: Vec<String> = node.methods().iter().map(ToString::to_string).collect();
            writeln!(f, "{:indent$}{label} [{}]", "", methods.join(","), indent = depth * 2)?;
            for child in node.children() {
                walk(child, depth + 1, f)?;
            }
            Ok(())
        }
        walk(&self.root, 0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(routes: &[(RouteMethod, &str, &'static str)]) -> Tree<&'static str> {
        let mut tree = Tree::new();
        for (method, path, id) in routes {
            tree.add(method.clone(), path, *id);
        }
        tree
    }

    fn post(path: &'static str, id: &'static str) -> (RouteMethod, &'static str, &'static str) {
        (RouteMethod::One(Method::POST), path, id)
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path(""), vec!["/"]);
        assert_eq!(split_path("/"), vec!["/"]);
        assert_eq!(split_path("/work"), vec!["/", "work"]);
        assert_eq!(split_path("."), vec!["/", "."]);
        assert_eq!(split_path("/a/b/c/"), vec!["/", "a", "b", "c"]);
        assert_eq!(split_path("  /a/  "), vec!["/", "a"]);
    }

    #[test]
    fn test_root_lookup() {
        let tree = tree_of(&[post("/", "1"), post("/work", "2")]);
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::POST, "/", &mut params), Some(&"1"));
        assert_eq!(tree.find(&Method::POST, "", &mut params), Some(&"1"));
        assert_eq!(tree.find(&Method::GET, "/", &mut params), None);
    }

    #[test]
    fn test_root_registered_with_empty_path() {
        let tree = tree_of(&[post("", "1"), post("/work", "2")]);
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::POST, "/", &mut params), Some(&"1"));
    }

    #[test]
    fn test_literal_routes() {
        let mut tree = tree_of(&[
            post("/", "1"),
            post("/work", "2"),
            post("/work/bork", "3"),
            post("/work/cork", "4"),
        ]);
        tree.add(Method::GET, "/work", "2");
        tree.add(RouteMethod::GetPost, "/walk/", "5");

        let mut params = Params::new();
        assert_eq!(tree.find(&Method::POST, "/work", &mut params), Some(&"2"));
        assert_eq!(tree.find(&Method::GET, "/work", &mut params), Some(&"2"));
        assert_eq!(tree.find(&Method::POST, "/work/cork", &mut params), Some(&"4"));
        assert_eq!(tree.find(&Method::GET, "/walk", &mut params), Some(&"5"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_intermediate_node_without_handler() {
        let tree = tree_of(&[
            post("/", "1"),
            post("/work/bork/pork", "2"),
            post("/work/bork", "3"),
            post("/work/cork", "4"),
        ]);
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::POST, "/work", &mut params), None);
        assert_eq!(tree.find(&Method::POST, "/work/cork", &mut params), Some(&"4"));
        assert_eq!(tree.find(&Method::POST, "/work/bork/pork", &mut params), Some(&"2"));
    }

    #[test]
    fn test_single_param() {
        let tree = tree_of(&[post("/", "1"), post("/:id", "2")]);
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::POST, "/vasya", &mut params), Some(&"2"));
        assert_eq!(params.get("id"), Some("vasya"));
    }

    #[test]
    fn test_param_then_literal() {
        let tree = tree_of(&[post("/", "1"), post("/:login", "2"), post("/:login/user", "3")]);
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::POST, "/vasya/user", &mut params), Some(&"3"));
        assert_eq!(params.get_all("login"), vec!["vasya"]);
    }

    #[test]
    fn test_param_between_literals() {
        let mut tree = Tree::new();
        tree.add(Method::GET, "/a/:x/b", "chain");
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::GET, "/a/42/b", &mut params), Some(&"chain"));
        assert_eq!(params.get("x"), Some("42"));
        assert_eq!(params.len(), 1);
    }

    fn login_tree() -> Tree<&'static str> {
        tree_of(&[
            post("/", "1"),
            post("/a/:id/borrow", "2"),
            post("/a/:id", "3"),
            post("/b/:login", "4"),
            post("/b/:login/admin", "5"),
            post("/b/:login/user", "6"),
            post("/b/:login/:login/user", "7"),
        ])
    }

    #[test]
    fn test_repeated_param_names_accumulate() {
        let tree = login_tree();
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::POST, "/b/vasya/user", &mut params), Some(&"6"));
        assert_eq!(params.get_all("login"), vec!["vasya"]);

        assert_eq!(
            tree.find(&Method::POST, "/b/vasya/petrov/user", &mut params),
            Some(&"7")
        );
        assert_eq!(params.get_all("login"), vec!["vasya", "petrov"]);
    }

    fn account_tree() -> Tree<&'static str> {
        let mut tree = tree_of(&[
            post("/", "1"),
            post("/a/:id/borrow", "2"),
            post("/a/:id", "3"),
            post("/b/:login", "4"),
            post("/b/:login/admin", "5"),
            post("/b/:login/user", "6"),
            post("/b/:login/:id/user", "7"),
            post("/a/:id/:login/admin", "8"),
            post("/a/:id/:login/user", "9"),
            post("/a/:id/:login/user/account", "10"),
        ]);
        tree.add(RouteMethod::GetPost, "/a/:id/user/account", "11");
        tree
    }

    #[test]
    fn test_distinct_param_names() {
        let tree = account_tree();
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::POST, "/b/vasya/123/user", &mut params), Some(&"7"));
        assert_eq!(params.get("id"), Some("123"));
        assert_eq!(params.get("login"), Some("vasya"));
    }

    #[test]
    fn test_params_with_spaces() {
        let tree = account_tree();
        let mut params = Params::new();

        assert_eq!(
            tree.find(&Method::POST, "/a/tennis player/Jean-Julien Rojer/user", &mut params),
            Some(&"9")
        );
        assert_eq!(params.get("id"), Some("tennis player"));
        assert_eq!(params.get("login"), Some("Jean-Julien Rojer"));

        assert_eq!(
            tree.find(
                &Method::POST,
                "/a/tennis player/Jean-Julien Rojer/user/account",
                &mut params
            ),
            Some(&"10")
        );
        assert_eq!(params.get("login"), Some("Jean-Julien Rojer"));
    }

    #[test]
    fn test_failed_branches_do_not_leak_params() {
        let tree = account_tree();
        let mut params = Params::new();

        assert_eq!(
            tree.find(&Method::POST, "/a/tennis player/user/account", &mut params),
            Some(&"11")
        );
        assert_eq!(params.get("id"), Some("tennis player"));
        assert!(!params.contains("login"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_composite_method_and_missing_method() {
        let tree = account_tree();
        let mut params = Params::new();

        assert_eq!(
            tree.find(&Method::GET, "/a/tennis player/user/account", &mut params),
            Some(&"11")
        );
        assert_eq!(
            tree.find(&Method::DELETE, "/a/tennis player/user/account", &mut params),
            None
        );
        assert!(params.is_empty());
        assert_eq!(tree.find(&Method::POST, "/a", &mut params), None);
        assert_eq!(tree.find(&Method::GET, "/a", &mut params), None);
        assert_eq!(tree.find(&Method::GET, "/", &mut params), None);
    }

    #[test]
    fn test_post_only_route_not_found_for_get() {
        let mut tree = Tree::new();
        tree.add(Method::POST, "/submit", "submit");
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::GET, "/submit", &mut params), None);
        assert_eq!(tree.find(&Method::POST, "/submit", &mut params), Some(&"submit"));
    }

    #[test]
    fn test_literal_and_param_siblings() {
        let mut tree = Tree::new();
        tree.add(Method::GET, "/work", "literal");
        tree.add(Method::GET, "/work/:id", "param");
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::GET, "/work", &mut params), Some(&"literal"));
        assert!(params.is_empty());
        assert_eq!(tree.find(&Method::GET, "/work/99", &mut params), Some(&"param"));
        assert_eq!(params.get("id"), Some("99"));
    }

    #[test]
    fn test_first_success_wins_in_insertion_order() {
        let mut tree = Tree::new();
        tree.add(Method::GET, "/files/:name", "param");
        tree.add(Method::GET, "/files/readme", "literal");
        let mut params = Params::new();

        // The parameter sibling was inserted first, so it is explored first.
        assert_eq!(tree.find(&Method::GET, "/files/readme", &mut params), Some(&"param"));
        assert_eq!(params.get("name"), Some("readme"));

        let mut tree = Tree::new();
        tree.add(Method::GET, "/files/readme", "literal");
        tree.add(Method::GET, "/files/:name", "param");
        assert_eq!(tree.find(&Method::GET, "/files/readme", &mut params), Some(&"literal"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_backtracks_past_method_mismatch() {
        let mut tree = Tree::new();
        tree.add(Method::POST, "/users/me", "me");
        tree.add(Method::GET, "/users/:id", "user");
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::GET, "/users/me", &mut params), Some(&"user"));
        assert_eq!(params.get("id"), Some("me"));
        assert_eq!(tree.find(&Method::POST, "/users/me", &mut params), Some(&"me"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_my_ads_routes() {
        let paths = [
            "/my-ads",
            "/my-ads/upload",
            "/my-ads/list",
            "/my-ads/take/:id",
            "/my-ads/take/:id/json",
            "/my-ads/take/:id/thumbnails",
            "/my-ads/:id/property/update",
            "/my-ads/:id/condition/:condition/add",
            "/my-ads/:id/condition/:condition/del",
            "/my-ads/:id/video_search/count",
            "/my-ads/attached_video/:id",
            "/advertiser/profile",
            "/advertiser/profile/data",
            "/advertiser/profile/budget/add",
        ];
        let mut tree = Tree::new();
        for (i, path) in paths.iter().enumerate() {
            tree.add(RouteMethod::GetPost, path, i);
        }
        let mut params = Params::new();

        assert_eq!(
            tree.find(&Method::POST, "/my-ads/attached_video/51", &mut params),
            Some(&10)
        );
        assert_eq!(params.get("id"), Some("51"));

        assert_eq!(
            tree.find(&Method::GET, "/my-ads/7/condition/new/del", &mut params),
            Some(&8)
        );
        assert_eq!(params.get("condition"), Some("new"));
        assert_eq!(tree.len(), paths.len());
    }

    #[test]
    fn test_every_branch_accumulator_is_released() {
        let tree = account_tree();
        let mut params = Params::new();

        tree.find(&Method::POST, "/a/x/y/user/account", &mut params);
        tree.find(&Method::DELETE, "/a/x/y/user/account", &mut params);
        tree.find(&Method::GET, "/nothing/here", &mut params);

        let stats = tree.pool().stats();
        assert_eq!(stats.outstanding, 0);
        assert!(stats.acquired > 3);
    }

    #[test]
    fn test_duplicate_registration_overwrites() {
        let mut tree = Tree::new();
        tree.add(Method::GET, "/dup", "first");
        tree.add(Method::GET, "/dup", "second");
        let mut params = Params::new();

        assert_eq!(tree.find(&Method::GET, "/dup", &mut params), Some(&"second"));
    }

    #[test]
    fn test_display_lists_nodes() {
        let mut tree = Tree::new();
        tree.add(Method::GET, "/users/:id", "user");
        let dump = tree.to_string();

        assert!(dump.contains("users"));
        assert!(dump.contains(":id [GET]"));
    }
}
