//! Liveness and reference ledger for hardware objects.
//!
//! Every hardware object the orchestration layer owns lives in an
//! `ObjectTable` slot holding its semantic value and a reference count. The
//! creator's hold is the first reference. An object is live while its count
//! is above zero; once [`ObjectTable::release`] reports the last reference
//! gone, the slot stays in place (dead) until the caller has torn down the
//! hardware object and calls [`ObjectTable::retire`], or undoes the release
//! with [`ObjectTable::restore`] when teardown failed.

use crate::sync_map::{HasRefCount, SyncMap};
use log::error;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectTableError {
    #[error("{table} {key} not found")]
    NotFound { table: &'static str, key: String },

    #[error("{table} {key} already exists")]
    AlreadyExists { table: &'static str, key: String },

    #[error("{table} {key} still referenced (ref_count={ref_count})")]
    InUse {
        table: &'static str,
        key: String,
        ref_count: u32,
    },
}

#[derive(Debug, Clone)]
struct Slot<V> {
    ref_count: u32,
    value: V,
}

impl<V> HasRefCount for Slot<V> {
    fn increment_ref(&mut self) -> u32 {
        self.ref_count = self.ref_count.saturating_add(1);
        self.ref_count
    }

    fn decrement_ref(&mut self) -> Option<u32> {
        self.ref_count = self.ref_count.checked_sub(1)?;
        Some(self.ref_count)
    }

    fn ref_count(&self) -> u32 {
        self.ref_count
    }
}

/// Reference-counted table of objects of one class.
#[derive(Debug, Clone)]
pub struct ObjectTable<K, V> {
    name: &'static str,
    slots: SyncMap<K, Slot<V>>,
}

impl<K, V> ObjectTable<K, V>
where
    K: Ord + Clone + Debug,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: SyncMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn not_found(&self, key: &K) -> ObjectTableError {
        ObjectTableError::NotFound {
            table: self.name,
            key: format!("{:?}", key),
        }
    }

    /// Runs `create` (the hardware write) and records its result with the
    /// creator's reference. Nothing is recorded when `create` fails.
    ///
    /// Use this for objects whose key is assigned by the hardware. A key
    /// that is already in the table is refused and the existing slot is left
    /// alone. The object `create` made cannot be removed by key without
    /// tearing down the existing one, so it stays orphaned in hardware.
    pub fn allocate<E, F>(&mut self, create: F) -> Result<K, E>
    where
        F: FnOnce() -> Result<(K, V), E>,
        E: From<ObjectTableError>,
    {
        let (key, value) = create()?;
        if self.slots.contains_key(&key) {
            error!(
                "ObjectTable: backend returned {} {:?} which is already allocated; new object orphaned",
                self.name, key
            );
            return Err(ObjectTableError::AlreadyExists {
                table: self.name,
                key: format!("{:?}", key),
            }
            .into());
        }
        self.slots.insert(key.clone(), Slot { ref_count: 1, value });
        Ok(key)
    }

    /// Like [`allocate`](Self::allocate) for caller-chosen keys. The key is
    /// checked before `create` runs.
    pub fn insert_with<E, F>(&mut self, key: K, create: F) -> Result<(), E>
    where
        F: FnOnce(&K) -> Result<V, E>,
        E: From<ObjectTableError>,
    {
        if self.slots.contains_key(&key) {
            return Err(ObjectTableError::AlreadyExists {
                table: self.name,
                key: format!("{:?}", key),
            }
            .into());
        }
        let value = create(&key)?;
        self.slots.insert(key, Slot { ref_count: 1, value });
        Ok(())
    }

    /// Takes a reference on a live object.
    pub fn retain(&mut self, key: &K) -> Result<u32, ObjectTableError> {
        if !self.is_live(key) {
            return Err(self.not_found(key));
        }
        self.slots
            .increment_ref(key)
            .map_err(|_| self.not_found(key))
    }

    /// Drops a reference. Returns true iff it was the last one and the
    /// object is now due for hardware teardown.
    pub fn release(&mut self, key: &K) -> Result<bool, ObjectTableError> {
        if !self.is_live(key) {
            return Err(self.not_found(key));
        }
        self.slots
            .decrement_ref(key)
            .map(|remaining| remaining == 0)
            .map_err(|_| self.not_found(key))
    }

    /// Re-takes a reference on an object whose last reference was just
    /// released, after its hardware teardown failed.
    pub fn restore(&mut self, key: &K) -> Result<u32, ObjectTableError> {
        self.slots
            .increment_ref(key)
            .map_err(|_| self.not_found(key))
    }

    /// Removes a dead slot and returns its value.
    pub fn retire(&mut self, key: &K) -> Result<V, ObjectTableError> {
        match self.slots.ref_count(key) {
            None => Err(self.not_found(key)),
            Some(0) => self
                .slots
                .remove(key)
                .map(|slot| slot.value)
                .ok_or_else(|| self.not_found(key)),
            Some(ref_count) => Err(ObjectTableError::InUse {
                table: self.name,
                key: format!("{:?}", key),
                ref_count,
            }),
        }
    }

    /// Fails with `InUse` unless the only reference left is `holds` deep.
    pub fn ensure_unreferenced(&self, key: &K, holds: u32) -> Result<(), ObjectTableError> {
        let ref_count = self.ref_count(key);
        if ref_count == 0 {
            return Err(self.not_found(key));
        }
        if ref_count > holds {
            return Err(ObjectTableError::InUse {
                table: self.name,
                key: format!("{:?}", key),
                ref_count,
            });
        }
        Ok(())
    }

    pub fn is_live(&self, key: &K) -> bool {
        self.slots.ref_count(key).is_some_and(|count| count > 0)
    }

    /// Zero for absent or dead objects.
    pub fn ref_count(&self, key: &K) -> u32 {
        self.slots.ref_count(key).unwrap_or(0)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.slots
            .get(key)
            .filter(|slot| slot.ref_count > 0)
            .map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.slots
            .get_mut(key)
            .filter(|slot| slot.ref_count > 0)
            .map(|slot| &mut slot.value)
    }

    /// Live objects in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.ref_count > 0)
            .map(|(key, slot)| (key, &slot.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.slots
            .iter_mut()
            .filter(|(_, slot)| slot.ref_count > 0)
            .map(|(key, slot)| (key, &mut slot.value))
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
