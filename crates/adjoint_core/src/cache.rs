//! Caches validated against variable identity and mutation state.
//!
//! An entry is keyed by the `(identity, state)` pair of every variable it
//! was built from. A lookup with any variable whose counter has advanced
//! rebuilds the entry.

use std::cell::RefCell;
use std::rc::Rc;

use crate::variable::{Variable, VariableId};

/// Identity and mutation counter of a variable at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateKey {
    id: VariableId,
    state: u64,
}

impl StateKey {
    /// Captures the current key of `variable`.
    #[inline]
    pub fn of(variable: &Variable) -> Self {
        Self {
            id: variable.id(),
            state: variable.state(),
        }
    }
}

/// Single-entry cache keyed by the state of its source variables.
///
/// # Examples
///
/// ```
/// use adjoint_core::{KeyedCache, Variable};
///
/// let k = Variable::with_values("k", vec![2.0]);
/// let mut cache: KeyedCache<f64> = KeyedCache::new();
///
/// let v = *cache.get_or_try_insert_with::<()>(&[&k], || Ok(k.value() * 10.0)).unwrap();
/// assert_eq!(v, 20.0);
///
/// k.scale(2.0);
/// let v = *cache.get_or_try_insert_with::<()>(&[&k], || Ok(k.value() * 10.0)).unwrap();
/// assert_eq!(v, 40.0);
/// assert_eq!(cache.misses(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct KeyedCache<V> {
    entry: Option<(Vec<StateKey>, V)>,
    hits: usize,
    misses: usize,
}

impl<V> KeyedCache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entry: None,
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the cached value built from `sources`, rebuilding it if any
    /// source has changed identity or state.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        sources: &[&Variable],
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<&V, E> {
        let key: Vec<StateKey> = sources.iter().map(|v| StateKey::of(v)).collect();
        let entry = match self.entry.take() {
            Some((k, v)) if k == key => {
                self.hits += 1;
                (k, v)
            }
            _ => {
                self.misses += 1;
                (key, build()?)
            }
        };
        Ok(&self.entry.insert(entry).1)
    }

    /// Returns `true` if the entry is valid for `sources`.
    pub fn is_valid(&self, sources: &[&Variable]) -> bool {
        match &self.entry {
            Some((k, _)) => {
                k.len() == sources.len()
                    && k.iter().zip(sources).all(|(key, v)| *key == StateKey::of(v))
            }
            None => false,
        }
    }

    /// Drops the entry.
    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// Number of lookups served from the entry.
    #[inline]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of lookups that rebuilt the entry.
    #[inline]
    pub fn misses(&self) -> usize {
        self.misses
    }
}

impl<V> Default for KeyedCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache shared between clones of an equation.
pub type SharedCache<V> = Rc<RefCell<KeyedCache<V>>>;

/// Creates an empty [`SharedCache`].
pub fn shared_cache<V>() -> SharedCache<V> {
    Rc::new(RefCell::new(KeyedCache::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(k: &Variable) -> Result<f64, ()> {
        Ok(k.sum())
    }

    #[test]
    fn test_hit_when_unchanged() {
        let k = Variable::with_values("k", vec![1.0, 2.0]);
        let mut cache = KeyedCache::new();
        cache.get_or_try_insert_with(&[&k], || build(&k)).unwrap();
        cache.get_or_try_insert_with(&[&k], || build(&k)).unwrap();
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert!(cache.is_valid(&[&k]));
    }

    #[test]
    fn test_invalidated_by_mutation() {
        let k = Variable::with_values("k", vec![1.0]);
        let mut cache = KeyedCache::new();
        cache.get_or_try_insert_with(&[&k], || build(&k)).unwrap();
        k.set_values(&[3.0]).unwrap();
        assert!(!cache.is_valid(&[&k]));
        let v = *cache.get_or_try_insert_with(&[&k], || build(&k)).unwrap();
        assert_eq!(v, 3.0);
    }

    #[test]
    fn test_invalidated_by_identity() {
        let a = Variable::with_values("k", vec![1.0]);
        let b = a.copy();
        let mut cache = KeyedCache::new();
        cache.get_or_try_insert_with(&[&a], || build(&a)).unwrap();
        assert!(!cache.is_valid(&[&b]));
    }

    #[test]
    fn test_failed_build_clears_entry() {
        let k = Variable::with_values("k", vec![1.0]);
        let mut cache: KeyedCache<f64> = KeyedCache::new();
        cache.get_or_try_insert_with(&[&k], || build(&k)).unwrap();
        k.scale(2.0);
        let result = cache.get_or_try_insert_with(&[&k], || Err::<f64, &str>("boom"));
        assert!(result.is_err());
        assert!(!cache.is_valid(&[&k]));
    }

    #[test]
    fn test_clear() {
        let k = Variable::with_values("k", vec![1.0]);
        let mut cache = KeyedCache::new();
        cache.get_or_try_insert_with(&[&k], || build(&k)).unwrap();
        cache.clear();
        assert!(!cache.is_valid(&[&k]));
    }
}
