//! # Connection Registry
//!
//! Slab arena holding every live connection. Slots are addressed by
//! [`ConnectionId`], which pairs the slab key with a generation counter so an
//! identifier that outlived its connection never resolves to whatever later
//! reused the slot.
//!
//! Sweeps iterate a snapshot of identifiers ([`Registry::ids`]) and look each
//! one up again, so removing the entry being visited (or any other) leaves the
//! sweep valid.

use slab::Slab;
use std::fmt;

// ─── ConnectionId ────────────────────────────────────────────────────────────

/// Stable handle to a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId {
    key: usize,
    generation: u64,
}

impl ConnectionId {
    /// Slab slot this id points at.
    pub fn key(self) -> usize {
        self.key
    }

    pub fn generation(self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.key, self.generation)
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

struct Slot<T> {
    generation: u64,
    value: T,
}

/// Arena of live entries with generation-checked lookup.
pub struct Registry<T> {
    entries: Slab<Slot<T>>,
    next_generation: u64,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Pre-allocate room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Registry {
            entries: Slab::with_capacity(capacity),
            next_generation: 0,
        }
    }

    /// Insert a value built from its own id.
    pub fn insert_with(&mut self, build: impl FnOnce(ConnectionId) -> T) -> ConnectionId {
        let entry = self.entries.vacant_entry();
        let id = ConnectionId {
            key: entry.key(),
            generation: self.next_generation,
        };
        self.next_generation += 1;
        entry.insert(Slot {
            generation: id.generation,
            value: build(id),
        });
        id
    }

    pub fn insert(&mut self, value: T) -> ConnectionId {
        self.insert_with(|_| value)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&T> {
        self.entries
            .get(id.key)
            .filter(|slot| slot.generation == id.generation)
            .map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut T> {
        self.entries
            .get_mut(id.key)
            .filter(|slot| slot.generation == id.generation)
            .map(|slot| &mut slot.value)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.get(id).is_some()
    }

    /// Unlink an entry, handing ownership back. A second call with the same id
    /// returns `None`.
    pub fn remove(&mut self, id: ConnectionId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        Some(self.entries.remove(id.key).value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the ids registered right now, in slot order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.entries
            .iter()
            .map(|(key, slot)| ConnectionId {
                key,
                generation: slot.generation,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &T)> {
        self.entries.iter().map(|(key, slot)| {
            (
                ConnectionId {
                    key,
                    generation: slot.generation,
                },
                &slot.value,
            )
        })
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
