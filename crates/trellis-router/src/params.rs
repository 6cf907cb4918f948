//! Path parameter storage.
//!
//! [`Params`] is an ordered multi-map: the same name may be pushed several
//! times and every value is kept in traversal order. Lookup clones one
//! accumulator per explored branch, so accumulators are recycled through a
//! [`ParamsPool`] instead of being allocated afresh each time.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

/// Maximum number of parameters stored inline (stack allocated).
const INLINE_PARAMS: usize = 4;

/// Free-list size used by [`ParamsPool::default`].
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// Extracted path parameters from a route match.
///
/// # Example
///
/// ```rust
/// use trellis_router::Params;
///
/// let mut params = Params::new();
/// params.push("login", "vasya");
/// params.push("login", "petrov");
///
/// assert_eq!(params.get("login"), Some("vasya"));
/// assert_eq!(params.get_all("login"), vec!["vasya", "petrov"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    /// Storage for parameter (name, value) pairs
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates a new empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a params set with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: SmallVec::with_capacity(capacity),
        }
    }

    /// Appends a value. Existing values under the same name are kept.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value recorded for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value recorded for `name`, in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns the pair at position `index`.
    #[must_use]
    pub fn by_index(&self, index: usize) -> Option<(&str, &str)> {
        self.inner
            .get(index)
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns true if at least one value is recorded for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(n, _)| n == name)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of recorded values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Clears all parameters, retaining allocated capacity.
    pub fn reset(&mut self) {
        self.inner.clear();
    }

    /// Replaces the contents with a copy of `other`.
    pub fn copy_from(&mut self, other: &Params) {
        self.inner.clear();
        self.inner.extend(other.inner.iter().cloned());
    }

    /// Removes every pair whose value is empty.
    pub fn squeeze(&mut self) {
        self.inner.retain(|(_, v)| !v.is_empty());
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

/// Counters exposed by [`ParamsPool::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Accumulators handed out and not yet released.
    pub outstanding: usize,
    /// Accumulators currently parked in the free list.
    pub idle: usize,
    /// Total number of `acquire` calls.
    pub acquired: u64,
}

#[derive(Debug)]
struct PoolInner {
    free: Vec<Params>,
    capacity: usize,
    stats: PoolStats,
}

/// A bounded free list of [`Params`] shared between clones.
///
/// # Example
///
/// ```rust
/// use trellis_router::ParamsPool;
///
/// let pool = ParamsPool::new(8);
/// let mut params = pool.acquire();
/// params.push("id", "1");
/// pool.release(params);
///
/// assert!(pool.acquire().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ParamsPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl Default for ParamsPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl ParamsPool {
    /// Creates a pool that keeps at most `capacity` idle accumulators.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free: Vec::with_capacity(capacity.min(DEFAULT_POOL_CAPACITY)),
                capacity,
                stats: PoolStats::default(),
            })),
        }
    }

    /// Takes an empty accumulator from the pool.
    pub fn acquire(&self) -> Params {
        let mut inner = self.inner.lock();
        inner.stats.outstanding += 1;
        inner.stats.acquired += 1;
        let params = inner.free.pop().unwrap_or_default();
        inner.stats.idle = inner.free.len();
        params
    }

    /// Returns an accumulator to the pool.
    pub fn release(&self, mut params: Params) {
        params.reset();
        let mut inner = self.inner.lock();
        inner.stats.outstanding = inner.stats.outstanding.saturating_sub(1);
        if inner.free.len() < inner.capacity {
            inner.free.push(params);
        }
        inner.stats.idle = inner.free.len();
    }

    /// Returns a snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats
    }
}
