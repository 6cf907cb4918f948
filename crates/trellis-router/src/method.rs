//! HTTP method slots.
//!
//! [`MethodMap`] stores one value per HTTP method for a single trie node or
//! pattern table. [`RouteMethod`] is what callers register with: a single
//! method or one of the composite pseudo-methods that expand to two.

use std::fmt;

use http::Method;
use smallvec::{smallvec, SmallVec};

/// The method a route is registered under.
///
/// # Example
///
/// ```rust
/// use trellis_router::RouteMethod;
/// use http::Method;
///
/// let methods = RouteMethod::GetHead.expand();
/// assert_eq!(methods.as_slice(), &[Method::GET, Method::HEAD]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    /// A single concrete method.
    One(Method),
    /// Registers the same value under GET and POST.
    GetPost,
    /// Registers the same value under GET and HEAD.
    GetHead,
}

impl RouteMethod {
    /// Returns the concrete methods this registration covers.
    #[must_use]
    pub fn expand(&self) -> SmallVec<[Method; 2]> {
        match self {
            Self::One(method) => smallvec![method.clone()],
            Self::GetPost => smallvec![Method::GET, Method::POST],
            Self::GetHead => smallvec![Method::GET, Method::HEAD],
        }
    }
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        Self::One(method)
    }
}

impl From<&Method> for RouteMethod {
    fn from(method: &Method) -> Self {
        Self::One(method.clone())
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(method) => write!(f, "{method}"),
            Self::GetPost => write!(f, "GET+POST"),
            Self::GetHead => write!(f, "GET+HEAD"),
        }
    }
}

/// One optional value per HTTP method.
///
/// Standard methods get a dedicated slot; extension methods fall back to a
/// small list searched linearly.
///
/// # Example
///
/// ```rust
/// use trellis_router::MethodMap;
/// use http::Method;
///
/// let mut map = MethodMap::new();
/// map.insert(Method::GET, "list");
/// map.insert(Method::POST, "create");
///
/// assert_eq!(map.get(&Method::GET), Some(&"list"));
/// assert_eq!(map.get(&Method::DELETE), None);
/// ```
#[derive(Debug, Clone)]
pub struct MethodMap<V> {
    get: Option<V>,
    post: Option<V>,
    put: Option<V>,
    delete: Option<V>,
    patch: Option<V>,
    head: Option<V>,
    options: Option<V>,
    trace: Option<V>,
    connect: Option<V>,
    extensions: Vec<(Method, V)>,
}

impl<V> Default for MethodMap<V> {
    fn default() -> Self {
        Self {
            get: None,
            post: None,
            put: None,
            delete: None,
            patch: None,
            head: None,
            options: None,
            trace: None,
            connect: None,
            extensions: Vec::new(),
        }
    }
}

impl<V> MethodMap<V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, method: &Method) -> Option<&Option<V>> {
        match *method {
            Method::GET => Some(&self.get),
            Method::POST => Some(&self.post),
            Method::PUT => Some(&self.put),
            Method::DELETE => Some(&self.delete),
            Method::PATCH => Some(&self.patch),
            Method::HEAD => Some(&self.head),
            Method::OPTIONS => Some(&self.options),
            Method::TRACE => Some(&self.trace),
            Method::CONNECT => Some(&self.connect),
            _ => None,
        }
    }

    fn slot_mut(&mut self, method: &Method) -> Option<&mut Option<V>> {
        match *method {
            Method::GET => Some(&mut self.get),
            Method::POST => Some(&mut self.post),
            Method::PUT => Some(&mut self.put),
            Method::DELETE => Some(&mut self.delete),
            Method::PATCH => Some(&mut self.patch),
            Method::HEAD => Some(&mut self.head),
            Method::OPTIONS => Some(&mut self.options),
            Method::TRACE => Some(&mut self.trace),
            Method::CONNECT => Some(&mut self.connect),
            _ => None,
        }
    }

    /// Stores `value` for `method`, returning the value it replaced.
    pub fn insert(&mut self, method: Method, value: V) -> Option<V> {
        if let Some(slot) = self.slot_mut(&method) {
            return slot.replace(value);
        }
        if let Some((_, existing)) = self.extensions.iter_mut().find(|(m, _)| *m == method) {
            return Some(std::mem::replace(existing, value));
        }
        self.extensions.push((method, value));
        None
    }

    /// Returns the value stored for `method`.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<&V> {
        match self.slot(method) {
            Some(slot) => slot.as_ref(),
            None => self
                .extensions
                .iter()
                .find(|(m, _)| m == method)
                .map(|(_, v)| v),
        }
    }

    /// Returns a mutable reference to the value stored for `method`.
    pub fn get_mut(&mut self, method: &Method) -> Option<&mut V> {
        if self.slot(method).is_some() {
            return self.slot_mut(method).and_then(Option::as_mut);
        }
        self.extensions
            .iter_mut()
            .find(|(m, _)| m == method)
            .map(|(_, v)| v)
    }

    /// Returns the value for `method`, inserting one built by `init` first
    /// when the slot is empty.
    pub fn get_or_insert_with(&mut self, method: &Method, init: impl FnOnce() -> V) -> &mut V {
        match *method {
            Method::GET => self.get.get_or_insert_with(init),
            Method::POST => self.post.get_or_insert_with(init),
            Method::PUT => self.put.get_or_insert_with(init),
            Method::DELETE => self.delete.get_or_insert_with(init),
            Method::PATCH => self.patch.get_or_insert_with(init),
            Method::HEAD => self.head.get_or_insert_with(init),
            Method::OPTIONS => self.options.get_or_insert_with(init),
            Method::TRACE => self.trace.get_or_insert_with(init),
            Method::CONNECT => self.connect.get_or_insert_with(init),
            _ => {
                let pos = match self.extensions.iter().position(|(m, _)| m == method) {
                    Some(pos) => pos,
                    None => {
                        self.extensions.push((method.clone(), init()));
                        self.extensions.len() - 1
                    }
                };
                &mut self.extensions[pos].1
            }
        }
    }

    /// Returns true if a value is stored for `method`.
    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        self.get(method).is_some()
    }

    /// Returns the methods that carry a value, standard methods first.
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        let standard = [
            (Method::GET, self.get.is_some()),
            (Method::POST, self.post.is_some()),
            (Method::PUT, self.put.is_some()),
            (Method::DELETE, self.delete.is_some()),
            (Method::PATCH, self.patch.is_some()),
            (Method::HEAD, self.head.is_some()),
            (Method::OPTIONS, self.options.is_some()),
            (Method::TRACE, self.trace.is_some()),
            (Method::CONNECT, self.connect.is_some()),
        ];
        standard
            .into_iter()
            .filter_map(|(m, set)| set.then_some(m))
            .chain(self.extensions.iter().map(|(m, _)| m.clone()))
            .collect()
    }

    /// Returns the number of methods that carry a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods().len()
    }

    /// Returns true if no method carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
