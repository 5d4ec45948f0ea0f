use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// Memoized settlements, indexed by normalized key.
pub trait Cache {
    type K;
    type V;

    fn get(&self, key: &Self::K) -> Option<&Self::V>;

    fn contains(&self, key: &Self::K) -> bool {
        self.get(key).is_some()
    }

    fn insert(&mut self, key: Self::K, value: Self::V);

    /// Inserts `value` unless `key` already holds a settlement. Returns whether it was inserted.
    fn insert_absent(&mut self, key: Self::K, value: Self::V) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.insert(key, value);
        true
    }

    fn remove(&mut self, keys: &[Self::K]);
    fn flush(&mut self);
}

impl<K, V, S: BuildHasher> Cache for HashMap<K, V, S>
where
    K: Eq + Hash,
{
    type K = K;
    type V = V;

    fn get(&self, key: &Self::K) -> Option<&Self::V> {
        HashMap::get(self, key)
    }

    fn insert(&mut self, key: Self::K, value: Self::V) {
        HashMap::insert(self, key, value);
    }

    fn remove(&mut self, keys: &[Self::K]) {
        for key in keys.iter() {
            HashMap::remove(self, key);
        }
    }

    fn flush(&mut self) {
        self.clear();
    }
}
