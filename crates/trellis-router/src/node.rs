//! Trie nodes.
//!
//! A node stands for one path segment. Children are kept in insertion
//! order because lookup returns the first successful branch it reaches.

use http::Method;

use crate::method::MethodMap;

/// The segment a node matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches one segment by exact text equality.
    Literal(String),
    /// Matches any one segment and records it under the given name.
    Param(String),
}

impl Segment {
    /// Parses a raw path segment. A leading `:` marks a parameter.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(':') {
            Some(name) => Self::Param(name.to_string()),
            None => Self::Literal(raw.to_string()),
        }
    }

    /// Returns true for parameter segments.
    #[must_use]
    pub fn is_param(&self) -> bool {
        matches!(self, Self::Param(_))
    }

    /// Returns the literal text, or `None` for a parameter.
    #[must_use]
    pub fn literal(&self) -> Option<&str> {
        match self {
            Self::Literal(text) => Some(text),
            Self::Param(_) => None,
        }
    }

    /// Returns true if this segment can consume `input` during lookup.
    #[must_use]
    pub fn accepts(&self, input: &str) -> bool {
        match self {
            Self::Literal(text) => text == input,
            Self::Param(_) => true,
        }
    }
}

/// A node in the routing trie.
#[derive(Debug, Clone)]
pub struct Node<V> {
    segment: Segment,
    children: Vec<Node<V>>,
    handlers: MethodMap<V>,
}

impl<V> Node<V> {
    /// Creates the root node, which matches `/`.
    #[must_use]
    pub fn root() -> Self {
        Self::new(Segment::Literal("/".to_string()))
    }

    /// Creates a node without children or handlers.
    #[must_use]
    pub fn new(segment: Segment) -> Self {
        Self {
            segment,
            children: Vec::new(),
            handlers: MethodMap::new(),
        }
    }

    /// Returns the segment this node matches.
    #[must_use]
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Returns the child nodes in insertion order.
    #[must_use]
    pub fn children(&self) -> &[Node<V>] {
        &self.children
    }

    /// Returns the value registered for `method` on this node.
    #[must_use]
    pub fn handler(&self, method: &Method) -> Option<&V> {
        self.handlers.get(method)
    }

    /// Returns the methods registered on this node.
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        self.handlers.methods()
    }
}

impl<V: Clone> Node<V> {
    pub(crate) fn set_handlers(&mut self, methods: &[Method], value: &V) {
        for method in methods {
            self.handlers.insert(method.clone(), value.clone());
        }
    }

    /// Places `segs` below this node.
    ///
    /// `segs[0]` is matched against the children. A parameter node treats
    /// every child as a candidate; a literal node only the child whose
    /// literal text equals the segment. Parameter children have no literal
    /// text, so a `:name` segment below a literal node always opens a new
    /// branch.
    pub(crate) fn insert(&mut self, segs: &[&str], methods: &[Method], value: &V) {
        let Some((&seg, rest)) = segs.split_first() else {
            return;
        };

        let accept_all = self.segment.is_param();
        let candidates: Vec<usize> = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, child)| accept_all || child.segment.literal() == Some(seg))
            .map(|(i, _)| i)
            .collect();

        if rest.is_empty() {
            if candidates.is_empty() {
                let mut leaf = Node::new(Segment::parse(seg));
                leaf.set_handlers(methods, value);
                self.children.push(leaf);
            } else {
                for i in candidates {
                    self.children[i].set_handlers(methods, value);
                }
            }
            return;
        }

        if candidates.is_empty() {
            self.children.push(Self::chain(segs, methods, value));
            return;
        }

        for i in candidates {
            self.children[i].insert(rest, methods, value);
        }
    }

    /// Builds a fresh branch for `segs`; the last node carries the handlers.
    fn chain(segs: &[&str], methods: &[Method], value: &V) -> Self {
        let mut node = Node::new(Segment::parse(segs[0]));
        if segs.len() == 1 {
            node.set_handlers(methods, value);
        } else {
            node.children.push(Self::chain(&segs[1..], methods, value));
        }
        node
    }
}
