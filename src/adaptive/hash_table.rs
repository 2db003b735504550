//! Adaptive hash table (spec.md §4.4): open-addressed Robin Hood hashing
//! with incremental rehash in the same spirit as the clock allocator — a
//! `current` table and, mid-migration, a `prev` table, with `insert`,
//! `lookup`, and `delete` each draining a bounded quantum from `prev`
//! before touching `current`. Used for the transaction table and the lock
//! table (spec.md §5).

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const DEFAULT_MIN_CAPACITY: usize = 16;
const DEFAULT_QUANTUM: usize = 4;
const GROW_LOAD_FACTOR: f64 = 0.75;
const SHRINK_LOAD_FACTOR: f64 = 0.2;

#[derive(Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
    psl: usize,
}

pub struct AdaptiveHashTable<K, V> {
    current: Vec<Option<Entry<K, V>>>,
    prev: Vec<Option<Entry<K, V>>>,
    migrate_cursor: usize,
    len: usize,
    min_capacity: usize,
    quantum: usize,
}

fn hash_of<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn slot_for(hash: u64, capacity: usize) -> usize {
    (hash as usize) % capacity
}

impl<K, V> Default for AdaptiveHashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V> AdaptiveHashTable<K, V> {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_MIN_CAPACITY, DEFAULT_QUANTUM)
    }

    pub fn with_params(min_capacity: usize, quantum: usize) -> Self {
        let capacity = min_capacity.max(4);
        Self {
            current: (0..capacity).map(|_| None).collect(),
            prev: Vec::new(),
            migrate_cursor: 0,
            len: 0,
            min_capacity: capacity,
            quantum: quantum.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn migrating(&self) -> bool {
        self.migrate_cursor < self.prev.len()
    }

    fn migrate_step(&mut self) {
        let mut moved = 0;
        while moved < self.quantum && self.migrate_cursor < self.prev.len() {
            let idx = self.migrate_cursor;
            self.migrate_cursor += 1;
            if let Some(entry) = self.prev[idx].take() {
                Self::robinhood_insert(&mut self.current, entry.key, entry.value);
                moved += 1;
            }
        }
    }

    fn load_factor(&self, extra: usize) -> f64 {
        (self.len + extra) as f64 / self.current.len() as f64
    }

    fn maybe_grow(&mut self) {
        if self.load_factor(1) >= GROW_LOAD_FACTOR {
            // Finish draining the current migration before starting a new
            // one, or the stale entries left in `prev` would be discarded
            // when it is overwritten below.
            while self.migrating() {
                self.migrate_step();
            }
            let new_capacity = self.current.len() * 2;
            self.rebuild_with_capacity(new_capacity);
        }
    }

    fn maybe_shrink(&mut self) {
        if self.migrating() {
            return;
        }
        if self.current.len() > self.min_capacity && self.load_factor(0) <= SHRINK_LOAD_FACTOR {
            let new_capacity = (self.current.len() / 2).max(self.min_capacity);
            self.rebuild_with_capacity(new_capacity);
        }
    }

    fn rebuild_with_capacity(&mut self, new_capacity: usize) {
        let old_current = std::mem::replace(
            &mut self.current,
            (0..new_capacity).map(|_| None).collect(),
        );
        self.prev = old_current;
        self.migrate_cursor = 0;
    }

    /// Robin Hood insert into `table`, updating in place if `key` is
    /// already present. Returns `true` if a brand new slot was consumed.
    fn robinhood_insert(table: &mut [Option<Entry<K, V>>], key: K, value: V) -> bool {
        let capacity = table.len();
        let mut idx = slot_for(hash_of(&key), capacity);
        let mut incoming = Entry { key, value, psl: 0 };

        loop {
            match &mut table[idx] {
                None => {
                    table[idx] = Some(incoming);
                    return true;
                }
                Some(occupant) => {
                    if occupant.key == incoming.key {
                        occupant.value = incoming.value;
                        return false;
                    }
                    if occupant.psl < incoming.psl {
                        std::mem::swap(occupant, &mut incoming);
                    }
                }
            }
            incoming.psl += 1;
            idx = (idx + 1) % capacity;
        }
    }

    fn find_index<Q>(table: &[Option<Entry<K, V>>], key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let capacity = table.len();
        if capacity == 0 {
            return None;
        }
        let mut idx = slot_for(hash_of(key), capacity);
        let mut psl = 0usize;
        loop {
            match &table[idx] {
                None => return None,
                Some(e) if e.key.borrow() == key => return Some(idx),
                Some(e) => {
                    if e.psl < psl {
                        return None;
                    }
                }
            }
            psl += 1;
            idx = (idx + 1) % capacity;
            if psl > capacity {
                return None;
            }
        }
    }

    /// Backward-shift deletion at `idx`, preserving Robin Hood invariants.
    fn remove_at(table: &mut [Option<Entry<K, V>>], idx: usize) -> V {
        let capacity = table.len();
        let removed = table[idx].take().expect("remove_at on empty slot");
        let mut hole = idx;
        loop {
            let next = (hole + 1) % capacity;
            let shift = matches!(&table[next], Some(e) if e.psl > 0);
            if !shift {
                break;
            }
            let mut entry = table[next].take().unwrap();
            entry.psl -= 1;
            table[hole] = Some(entry);
            hole = next;
        }
        removed.value
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.migrate_step();
        let existed_in_prev = Self::find_index(&self.prev, &key).map(|i| Self::remove_at(&mut self.prev, i));
        self.maybe_grow();
        let fresh = Self::robinhood_insert(&mut self.current, key, value);
        if fresh && existed_in_prev.is_none() {
            self.len += 1;
        }
    }

    pub fn lookup<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.migrate_step();
        if let Some(idx) = Self::find_index(&self.current, key) {
            return self.current[idx].as_ref().map(|e| &e.value);
        }
        if let Some(idx) = Self::find_index(&self.prev, key) {
            return self.prev[idx].as_ref().map(|e| &e.value);
        }
        None
    }

    pub fn delete<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.migrate_step();
        let result = if let Some(idx) = Self::find_index(&self.current, key) {
            Some(Self::remove_at(&mut self.current, idx))
        } else if let Some(idx) = Self::find_index(&self.prev, key) {
            Some(Self::remove_at(&mut self.prev, idx))
        } else {
            None
        };
        if result.is_some() {
            self.len -= 1;
            self.maybe_shrink();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_lookup_delete() {
        let mut t: AdaptiveHashTable<String, i32> = AdaptiveHashTable::with_params(4, 2);
        t.insert("a".to_string(), 1);
        t.insert("b".to_string(), 2);
        assert_eq!(*t.lookup("a").unwrap(), 1);
        assert_eq!(*t.lookup("b").unwrap(), 2);
        assert_eq!(t.delete("a"), Some(1));
        assert!(t.lookup("a").is_none());
    }

    #[test]
    fn last_insert_wins_across_migration() {
        let mut t: AdaptiveHashTable<i32, i32> = AdaptiveHashTable::with_params(4, 1);
        for i in 0..30 {
            t.insert(i, i * 10);
        }
        for i in 0..30 {
            t.insert(i, i * 100);
        }
        for i in 0..30 {
            assert_eq!(*t.lookup(&i).unwrap(), i * 100);
        }
        assert_eq!(t.len(), 30);
    }

    #[test]
    fn survives_growth_and_shrink() {
        let mut t: AdaptiveHashTable<i32, i32> = AdaptiveHashTable::with_params(4, 4);
        let keys: Vec<i32> = (0..50).collect();
        for &k in &keys {
            t.insert(k, k);
        }
        for &k in keys.iter().take(45) {
            t.delete(&k);
        }
        for _ in 0..20 {
            t.lookup(&0);
        }
        for &k in keys.iter().skip(45) {
            assert_eq!(*t.lookup(&k).unwrap(), k);
        }
    }
}
