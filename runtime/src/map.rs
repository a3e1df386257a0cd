use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

use im::HashMap as ImHashMap;
use rustc_hash::FxBuildHasher;

use crate::error::KeyMiss;

// ============================================================================
// Persistent Map
// ============================================================================

/// Immutable associative collection with structural sharing.
///
/// Backed by an `im::HashMap` (a hash array mapped trie) with a fixed Fx
/// hasher, so two maps built from the same operations iterate in the same
/// order across runs. Equality is by key-value set; iteration order carries
/// no meaning.
#[derive(Clone)]
pub struct PersistentMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    entries: ImHashMap<K, V, FxBuildHasher>,
}

impl<K, V> PersistentMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        PersistentMap {
            entries: ImHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return a new map with `key` bound to `value`, replacing any old binding.
    pub fn assoc(&self, key: K, value: V) -> Self {
        PersistentMap {
            entries: self.entries.update(key, value),
        }
    }

    /// Return a new map without `key`. Absent keys yield an equal map.
    pub fn dissoc(&self, key: &K) -> Self {
        if !self.entries.contains_key(key) {
            return self.clone();
        }
        PersistentMap {
            entries: self.entries.without(key),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_or<'a>(&'a self, key: &K, default: &'a V) -> &'a V {
        self.entries.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}

impl<K, V> PersistentMap<K, V>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone,
{
    /// Strict lookup: a missing key is a `KeyMiss` rather than `None`.
    pub fn fetch(&self, key: &K) -> Result<&V, KeyMiss> {
        self.entries.get(key).ok_or_else(|| KeyMiss {
            key: key.to_string(),
        })
    }
}

impl<K, V> Default for PersistentMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for PersistentMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PersistentMap::new(), |map, (k, v)| map.assoc(k, v))
    }
}

impl<K, V> PartialEq for PersistentMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K, V> Eq for PersistentMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Eq,
{
}

impl<K, V> Hash for PersistentMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Entry hashes are summed so the result does not depend on trie layout.
        let combined = self.entries.iter().fold(0u64, |acc, entry| {
            acc.wrapping_add(FxBuildHasher.hash_one(entry))
        });
        state.write_usize(self.entries.len());
        state.write_u64(combined);
    }
}

impl<K, V> fmt::Debug for PersistentMap<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
