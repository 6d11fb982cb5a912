// Extendible Hash Table
//
// Generic concurrent mapping used as the buffer pool's page table. The
// directory doubles when a full bucket already sits at global depth; a
// remove never merges buckets or shrinks the directory.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// A single bucket: bounded, order-preserving list of entries at some
/// local depth.
struct Bucket<K, V> {
    depth: usize,
    items: Vec<(K, V)>,
}

impl<K: PartialEq + Clone, V: Clone> Bucket<K, V> {
    fn new(depth: usize) -> Self {
        Self { depth, items: Vec::new() }
    }

    fn find(&self, key: &K) -> Option<V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    fn remove(&mut self, key: &K) -> bool {
        if let Some(pos) = self.items.iter().position(|(k, _)| k == key) {
            self.items.remove(pos);
            return true;
        }
        false
    }

    /// Insert or update. Returns false when the bucket is full and the key
    /// is not already present.
    fn insert(&mut self, key: K, value: V, capacity: usize) -> bool {
        if let Some(pos) = self.items.iter().position(|(k, _)| *k == key) {
            self.items[pos].1 = value;
            return true;
        }
        if self.items.len() >= capacity {
            return false;
        }
        self.items.push((key, value));
        true
    }
}

struct HashTableState<K, V> {
    global_depth: usize,
    num_buckets: usize,
    /// Directory of indices into `buckets`; slots whose low `depth` bits
    /// match share the same bucket.
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// Concurrent extendible hash table guarded by a single mutex.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    state: Mutex<HashTableState<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + PartialEq + Clone,
    V: Clone,
{
    pub fn new(bucket_size: usize) -> Self {
        let state = HashTableState {
            global_depth: 0,
            num_buckets: 1,
            dir: vec![0],
            buckets: vec![Bucket::new(0)],
        };
        Self { bucket_size, state: Mutex::new(state) }
    }

    fn hash(key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    fn index_of(state: &HashTableState<K, V>, key: &K) -> usize {
        let mask = (1usize << state.global_depth) - 1;
        Self::hash(key) & mask
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let state = self.state.lock();
        let idx = Self::index_of(&state, key);
        state.buckets[state.dir[idx]].find(key)
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut state = self.state.lock();
        let idx = Self::index_of(&state, key);
        let bucket_idx = state.dir[idx];
        state.buckets[bucket_idx].remove(key)
    }

    /// Insert or update a key. A full bucket splits, doubling the
    /// directory when its local depth has reached the global depth;
    /// redistribution may cascade.
    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();
        loop {
            let idx = Self::index_of(&state, &key);
            let bucket_idx = state.dir[idx];
            if state.buckets[bucket_idx].insert(key.clone(), value.clone(), self.bucket_size) {
                return;
            }

            let old_depth = state.buckets[bucket_idx].depth;
            if old_depth == state.global_depth {
                // Double the directory, cloning the pointer pattern.
                state.global_depth += 1;
                let half = 1usize << (state.global_depth - 1);
                let mut new_dir = Vec::with_capacity(1 << state.global_depth);
                for i in 0..(1usize << state.global_depth) {
                    new_dir.push(state.dir[i & (half - 1)]);
                }
                state.dir = new_dir;
            }

            // Split: the old slot becomes bucket0 at depth+1, a fresh slot
            // becomes bucket1; every directory entry stamped with the old
            // bucket's low bits is repointed by bit `old_depth`.
            let drained: Vec<(K, V)> = std::mem::take(&mut state.buckets[bucket_idx].items);
            state.buckets[bucket_idx].depth = old_depth + 1;
            let bucket1_idx = state.buckets.len();
            state.buckets.push(Bucket::new(old_depth + 1));
            state.num_buckets += 1;

            let stamp = idx & ((1usize << old_depth) - 1);
            let global_depth = state.global_depth;
            for i in 0..(1usize << (global_depth - old_depth)) {
                let slot = (i << old_depth) | stamp;
                state.dir[slot] = if i & 1 == 1 { bucket1_idx } else { bucket_idx };
            }

            for (k, v) in drained {
                let idx = Self::index_of(&state, &k);
                let target = state.dir[idx];
                state.buckets[target].insert(k, v, self.bucket_size);
            }
        }
    }

    pub fn global_depth(&self) -> usize {
        self.state.lock().global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> usize {
        let state = self.state.lock();
        state.buckets[state.dir[dir_index]].depth
    }

    pub fn num_buckets(&self) -> usize {
        self.state.lock().num_buckets
    }

    pub fn dir_size(&self) -> usize {
        self.state.lock().dir.len()
    }
}
