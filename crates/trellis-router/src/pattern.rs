//! Regular-expression fallback routes.
//!
//! Consulted only when the trie has no match. Patterns carry no parameters;
//! a match simply selects the registered value.

use http::Method;
use regex::Regex;

use crate::method::{MethodMap, RouteMethod};

/// Per-method lists of `(pattern, value)` pairs.
///
/// # Example
///
/// ```rust
/// use trellis_router::{PatternRouter, RouteMethod};
/// use http::Method;
///
/// let mut patterns = PatternRouter::new();
/// patterns.add_str(RouteMethod::GetHead, "^/static/.*", "assets").unwrap();
///
/// assert_eq!(patterns.find(&Method::HEAD, "/static/app.css"), Some(&"assets"));
/// assert_eq!(patterns.find(&Method::POST, "/static/app.css"), None);
/// ```
#[derive(Debug, Clone)]
pub struct PatternRouter<V> {
    routes: MethodMap<Vec<(Regex, V)>>,
    count: usize,
}

impl<V> Default for PatternRouter<V> {
    fn default() -> Self {
        Self {
            routes: MethodMap::new(),
            count: 0,
        }
    }
}

impl<V: Clone> PatternRouter<V> {
    /// Creates an empty pattern table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a compiled pattern for `method`.
    pub fn add(&mut self, method: impl Into<RouteMethod>, pattern: Regex, value: V) {
        for method in method.into().expand() {
            self.routes
                .get_or_insert_with(&method, Vec::new)
                .push((pattern.clone(), value.clone()));
        }
        self.count += 1;
    }

    /// Compiles `pattern` and appends it for `method`.
    pub fn add_str(
        &mut self,
        method: impl Into<RouteMethod>,
        pattern: &str,
        value: V,
    ) -> Result<(), regex::Error> {
        let compiled = Regex::new(pattern)?;
        self.add(method, compiled, value);
        Ok(())
    }

    /// Returns the value of the first pattern, in registration order, that
    /// matches `path`.
    #[must_use]
    pub fn find(&self, method: &Method, path: &str) -> Option<&V> {
        self.routes
            .get(method)?
            .iter()
            .find(|(pattern, _)| pattern.is_match(path))
            .map(|(_, value)| value)
    }

    /// Returns the patterns registered for `method`.
    #[must_use]
    pub fn patterns(&self, method: &Method) -> Vec<&str> {
        self.routes
            .get(method)
            .map(|list| list.iter().map(|(p, _)| p.as_str()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registered_match_wins() {
        let mut patterns = PatternRouter::new();
        patterns.add_str(Method::GET, "^/img/.*", "images").unwrap();
        patterns.add_str(Method::GET, "^/img/logo\\.png$", "logo").unwrap();

        assert_eq!(patterns.find(&Method::GET, "/img/logo.png"), Some(&"images"));
    }

    #[test]
    fn test_no_match() {
        let mut patterns = PatternRouter::new();
        patterns.add_str(Method::GET, "^/img/.*", "images").unwrap();

        assert_eq!(patterns.find(&Method::GET, "/css/app.css"), None);
        assert_eq!(patterns.find(&Method::PUT, "/img/a.png"), None);
    }

    #[test]
    fn test_composite_method() {
        let mut patterns = PatternRouter::new();
        patterns.add_str(RouteMethod::GetPost, "^/rpc/.*", "rpc").unwrap();

        assert_eq!(patterns.find(&Method::GET, "/rpc/call"), Some(&"rpc"));
        assert_eq!(patterns.find(&Method::POST, "/rpc/call"), Some(&"rpc"));
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns.patterns(&Method::POST), vec!["^/rpc/.*"]);
    }

    #[test]
    fn test_invalid_pattern() {
        let mut patterns: PatternRouter<&str> = PatternRouter::new();
        assert!(patterns.add_str(Method::GET, "(unclosed", "x").is_err());
        assert!(patterns.is_empty());
    }
}
