//! Insertion-ordered map used as the shared backbone of both cache tiers.
//!
//! This structure knows nothing about byte budgets or entry removability:
//! the enclosing cache decides when an insert must evict and what to do with
//! the victim it gets back. Insertion order doubles as recency order under
//! the promote-on-hit policy both caches adopt (see DESIGN.md): a lookup
//! that promotes calls `touch`, moving the key to the newest end. Oldest
//! entries are therefore always the eviction
//! candidates, scanned from the front via `oldest`.

use indexmap::IndexMap;

use crate::fingerprint::Fingerprint;

/// An insertion-ordered `Fingerprint -> V` map.
pub struct OrderedFingerprintMap<V> {
    map: IndexMap<Fingerprint, V>,
}

impl<V> OrderedFingerprintMap<V> {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: Fingerprint) -> bool {
        self.map.contains_key(&key)
    }

    pub fn lookup(&self, key: Fingerprint) -> Option<&V> {
        self.map.get(&key)
    }

    /// Moves `key` to the newest end of the order, if present. Used to
    /// implement promote-on-hit.
    pub fn touch(&mut self, key: Fingerprint) {
        if let Some(index) = self.map.get_index_of(&key) {
            self.map.move_index(index, self.map.len() - 1);
        }
    }

    /// Inserts `value` under `key`, which must not already be present
    /// (duplicate keys are a caller error).
    ///
    /// If `must_evict` is `true` and the map is non-empty, the
    /// least-recently-inserted pair is removed and returned as the victim
    /// before the new pair is placed at the newest end.
    pub fn insert(
        &mut self,
        key: Fingerprint,
        value: V,
        must_evict: bool,
    ) -> Option<(Fingerprint, V)> {
        debug_assert!(!self.map.contains_key(&key), "duplicate key inserted");

        let victim = if must_evict {
            self.evict_oldest()
        } else {
            None
        };
        self.map.insert(key, value);
        victim
    }

    pub fn remove(&mut self, key: Fingerprint) -> Option<V> {
        self.map.shift_remove(&key)
    }

    /// Evicts and returns the oldest entry, or `None` if empty.
    pub fn evict_oldest(&mut self) -> Option<(Fingerprint, V)> {
        self.map.shift_remove_index(0)
    }

    /// Iterates from oldest to newest, the order eviction scans candidates
    /// in.
    pub fn oldest(&self) -> impl Iterator<Item = (&Fingerprint, &V)> {
        self.map.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<V> Default for OrderedFingerprintMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_without_eviction_grows_the_map() {
        let mut map = OrderedFingerprintMap::new();
        assert!(map.insert(Fingerprint(1), "a", false).is_none());
        assert!(map.insert(Fingerprint(2), "b", false).is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn insert_evicts_oldest_when_must_evict_is_true() {
        let mut map = OrderedFingerprintMap::new();
        map.insert(Fingerprint(1), "a", false);
        map.insert(Fingerprint(2), "b", false);
        let victim = map.insert(Fingerprint(3), "c", true);
        assert_eq!(victim, Some((Fingerprint(1), "a")));
        assert!(!map.contains(Fingerprint(1)));
        assert!(map.contains(Fingerprint(3)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn must_evict_on_empty_map_returns_no_victim() {
        let mut map: OrderedFingerprintMap<&str> = OrderedFingerprintMap::new();
        assert!(map.insert(Fingerprint(1), "a", true).is_none());
    }

    #[test]
    fn touch_moves_key_to_newest_end() {
        let mut map = OrderedFingerprintMap::new();
        map.insert(Fingerprint(1), "a", false);
        map.insert(Fingerprint(2), "b", false);
        map.touch(Fingerprint(1));
        let order: Vec<_> = map.oldest().map(|(k, _)| *k).collect();
        assert_eq!(order, vec![Fingerprint(2), Fingerprint(1)]);
    }

    #[test]
    fn oldest_to_newest_iteration_order() {
        let mut map = OrderedFingerprintMap::new();
        map.insert(Fingerprint(1), "a", false);
        map.insert(Fingerprint(2), "b", false);
        map.insert(Fingerprint(3), "c", false);
        let order: Vec<_> = map.oldest().map(|(k, _)| *k).collect();
        assert_eq!(
            order,
            vec![Fingerprint(1), Fingerprint(2), Fingerprint(3)]
        );
    }
}
