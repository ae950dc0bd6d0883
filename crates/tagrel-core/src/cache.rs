//! Bounded, time-limited memo of inference pages and the cross-call dedup set.
//!
//! Both structures evict oldest-first once full. Neither is synchronized on
//! its own; the engine owns them behind its state lock.

use std::collections::VecDeque;
use std::hash::Hash;
use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted: Instant,
}

/// Insertion-ordered cache with a TTL and a capacity.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    capacity: usize,
    entries: AHashMap<K, Entry<V>>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: AHashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Fresh value for `key`; an expired entry is dropped on access.
    pub fn get(&mut self, key: &K, now: Instant) -> Option<V> {
        let fresh = self
            .entries
            .get(key)
            .map(|e| now.saturating_duration_since(e.inserted) < self.ttl)?;
        if fresh {
            return self.entries.get(key).map(|e| e.value.clone());
        }
        self.remove(key);
        None
    }

    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.remove(&key);
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                inserted: now,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove(&mut self, key: &K) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

/// Set with a capacity; inserting into a full set forgets the oldest member.
#[derive(Debug)]
pub struct BoundedSet<T> {
    capacity: usize,
    members: AHashSet<T>,
    order: VecDeque<T>,
}

impl<T: Eq + Hash + Clone> BoundedSet<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: AHashSet::new(),
            order: VecDeque::new(),
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.members.contains(value)
    }

    pub fn insert(&mut self, value: T) {
        if self.capacity == 0 || self.members.contains(&value) {
            return;
        }
        while self.members.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.members.remove(&oldest);
        }
        self.order.push_back(value.clone());
        self.members.insert(value);
    }

    /// Change the capacity, forgetting the oldest members if it shrinks.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.members.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.members.remove(&oldest);
        }
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
