//! Ordered map without auto-vivification.
//!
//! `SyncMap` only ever creates an entry through [`SyncMap::insert`]. Lookups
//! and reference-count changes on a missing key report the miss instead of
//! default-constructing a value, so a stray `increment_ref` can never bring a
//! deleted object back.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncMapError {
    #[error("key not found")]
    KeyNotFound,

    #[error("reference count underflow")]
    RefCountUnderflow,
}

/// Values that carry their own reference count.
pub trait HasRefCount {
    fn increment_ref(&mut self) -> u32;

    /// Returns `None` instead of wrapping below zero.
    fn decrement_ref(&mut self) -> Option<u32>;

    fn ref_count(&self) -> u32;
}

/// Ordered map that never creates entries implicitly.
///
/// ```
/// use l3_orch_common::SyncMap;
///
/// let mut map: SyncMap<u32, &str> = SyncMap::new();
/// assert!(map.get(&1).is_none());
/// assert!(map.is_empty());
///
/// map.insert(1, "one");
/// assert_eq!(map.get(&1), Some(&"one"));
/// ```
#[derive(Debug, Clone)]
pub struct SyncMap<K, V> {
    inner: BTreeMap<K, V>,
}

impl<K: Ord, V> SyncMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Returns the previous value if the key was present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Iterates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.inner.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }
}

impl<K: Ord, V: HasRefCount> SyncMap<K, V> {
    /// Increments the count of an existing entry. Missing keys are an error,
    /// never an insert.
    pub fn increment_ref(&mut self, key: &K) -> Result<u32, SyncMapError> {
        self.inner
            .get_mut(key)
            .map(HasRefCount::increment_ref)
            .ok_or(SyncMapError::KeyNotFound)
    }

    pub fn decrement_ref(&mut self, key: &K) -> Result<u32, SyncMapError> {
        let entry = self.inner.get_mut(key).ok_or(SyncMapError::KeyNotFound)?;
        entry.decrement_ref().ok_or(SyncMapError::RefCountUnderflow)
    }

    pub fn ref_count(&self, key: &K) -> Option<u32> {
        self.inner.get(key).map(HasRefCount::ref_count)
    }
}

impl<K: Ord, V> Default for SyncMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for SyncMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
