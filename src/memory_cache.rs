//! Single-tier, heap-resident cache.

use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use crate::{
    config::CacheConfig,
    entry::{Borrow, CacheEntry, MemoryEntry},
    error::CacheError,
    fingerprint::Fingerprint,
    ordered_map::OrderedFingerprintMap,
};

struct State {
    map: OrderedFingerprintMap<Arc<MemoryEntry>>,
    current_bytes: u64,
}

/// A byte-budgeted cache of heap-resident entries.
///
/// There is only one tier here, so there is no demotion: the only lifecycle
/// events are admission and eviction (unlike [`crate::disk_cache::DiskCache`],
/// which also demotes and promotes between its two tiers).
pub struct MemoryCache {
    budget: u64,
    state: Mutex<State>,
}

impl MemoryCache {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            state: Mutex::new(State {
                map: OrderedFingerprintMap::new(),
                current_bytes: 0,
            }),
        }
    }

    /// Builds a cache using the byte budget described by `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.budget_bytes)
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn current_bytes(&self) -> u64 {
        self.state.lock().current_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks the entry up and, on hit, returns a borrow with its reference
    /// count already incremented.
    pub fn get(&self, key: Fingerprint) -> Option<Borrow<MemoryEntry>> {
        let mut state = self.state.lock();
        state.map.touch(key);
        state.map.lookup(key).cloned().map(Borrow::new)
    }

    /// Admits `entry` under `key`. `entry` must not already be present.
    ///
    /// Returns `true` if admission evicted something to make room.
    pub fn add(&self, key: Fingerprint, entry: Arc<MemoryEntry>) -> bool {
        let size = entry.size();

        let victim = {
            let mut state = self.state.lock();
            let must_evict = state.current_bytes + size >= self.budget;
            state.current_bytes += size;
            state.map.insert(key, entry, must_evict)
        };

        let Some((victim_key, victim)) = victim else {
            return false;
        };

        self.cascade_victim(victim_key, victim);
        true
    }

    /// Processes a victim popped from the map: drops it if removable,
    /// otherwise re-admits it forcing eviction of the next-oldest entry,
    /// repeating until a removable victim turns up.
    ///
    /// Bounded against the case where every entry in the tier is
    /// referenced: a full pass that finds nothing removable means eviction
    /// cannot make progress, so the looping victim is admitted back in
    /// without forcing further eviction (budget is exceeded transiently)
    /// and a diagnostic is logged, instead of spinning forever.
    fn cascade_victim(&self, mut victim_key: Fingerprint, mut victim: Arc<MemoryEntry>) {
        let saturation_bound = self.state.lock().map.len() + 1;
        let mut attempts = 0usize;

        loop {
            {
                let mut state = self.state.lock();
                state.current_bytes = state.current_bytes.saturating_sub(victim.size());
            }

            if victim.is_removable() {
                drop(victim);
                return;
            }

            attempts += 1;
            let size = victim.size();
            let mut state = self.state.lock();
            state.current_bytes += size;

            if attempts > saturation_bound {
                let err = CacheError::NonRemovableSaturation {
                    count: saturation_bound,
                };
                warn!("{}", err);
                state.map.insert(victim_key, victim, false);
                return;
            }

            match state.map.insert(victim_key, victim, true) {
                Some((next_key, next_victim)) => {
                    victim_key = next_key;
                    victim = next_victim;
                    continue;
                }
                None => return,
            }
        }
    }

    /// Evicts every removable entry; non-removable entries are re-admitted
    /// and left in place.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let mut retained = Vec::new();
        while let Some((key, entry)) = state.map.evict_oldest() {
            state.current_bytes = state.current_bytes.saturating_sub(entry.size());
            if entry.is_removable() {
                drop(entry);
            } else {
                retained.push((key, entry));
            }
        }
        for (key, entry) in retained {
            state.current_bytes += entry.size();
            let _ = state.map.insert(key, entry, false);
        }
    }
}
