//! Size-bounded map with batched least-recently-used eviction.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// A map that holds at most `capacity` entries. Going over the limit evicts
/// the least recently used entries in one batch, freeing `free_factor` of the
/// capacity so steady-state inserts do not evict on every call. Reads count
/// as use.
pub struct BoundedLruMap<K, V> {
    capacity: usize,
    keep_after_purge: usize,
    sequence: u64,
    entries: HashMap<K, (u64, V)>,
    order: BTreeMap<u64, K>,
}

impl<K: Eq + Hash + Clone, V> BoundedLruMap<K, V> {
    pub fn new(capacity: usize, free_factor: f64) -> Self {
        let capacity = capacity.max(1);
        let freed = (capacity as f64 * free_factor.clamp(0.0, 1.0)) as usize;
        Self {
            capacity,
            keep_after_purge: (capacity - freed).max(1),
            sequence: 0,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.sequence += 1;
        let previous = self.entries.insert(key.clone(), (self.sequence, value));
        if let Some((old_sequence, _)) = previous {
            self.order.remove(&old_sequence);
        }
        self.order.insert(self.sequence, key);
        if self.entries.len() > self.capacity {
            self.purge();
        }
        previous.map(|(_, value)| value)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.touch(key)?;
        self.entries.get(key).map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.touch(key)?;
        self.entries.get_mut(key).map(|(_, value)| value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (sequence, value) = self.entries.remove(key)?;
        self.order.remove(&sequence);
        Some(value)
    }

    fn touch(&mut self, key: &K) -> Option<()> {
        let entry = self.entries.get_mut(key)?;
        let old_sequence = entry.0;
        self.sequence += 1;
        entry.0 = self.sequence;
        if let Some(key) = self.order.remove(&old_sequence) {
            self.order.insert(self.sequence, key);
        }
        Some(())
    }

    fn purge(&mut self) {
        while self.entries.len() > self.keep_after_purge {
            let Some((&oldest, _)) = self.order.iter().next() else {
                return;
            };
            if let Some(key) = self.order.remove(&oldest) {
                self.entries.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_insert_within_capacity_keeps_everything() {
        let mut map = BoundedLruMap::new(4, 0.5);
        for id in 0..4 {
            map.insert(id, id * 10);
        }
        assert_eq!(map.len(), 4);
        assert_eq!(map.get(&0), Some(&0));
    }

    #[test]
    fn functional_overflow_purges_down_to_retained_share() {
        let mut map = BoundedLruMap::new(4, 0.5);
        for id in 0..5 {
            map.insert(id, id);
        }
        // One batched purge keeps the two most recent entries.
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&3), Some(&3));
        assert_eq!(map.get(&4), Some(&4));
        assert_eq!(map.get(&0), None);
    }

    #[test]
    fn functional_reads_refresh_recency() {
        let mut map = BoundedLruMap::new(4, 0.5);
        for id in 0..4 {
            map.insert(id, id);
        }
        map.get(&0);
        map.insert(4, 4);
        assert_eq!(map.get(&0), Some(&0));
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn unit_reinserting_a_key_replaces_without_growing() {
        let mut map = BoundedLruMap::new(4, 0.5);
        map.insert("k", 1);
        assert_eq!(map.insert("k", 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&"k"), Some(&2));
    }

    #[test]
    fn unit_remove_drops_the_entry() {
        let mut map = BoundedLruMap::new(4, 0.5);
        map.insert(9, "x");
        assert_eq!(map.remove(&9), Some("x"));
        assert!(map.is_empty());
    }
}
