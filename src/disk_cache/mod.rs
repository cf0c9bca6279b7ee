//! The disk-backed two-tier cache: a bounded resident (mapped) tier over a
//! larger, budget-capped persistent (unmapped, file-only) tier.

pub mod layout;
pub mod persistence;

use std::{path::PathBuf, sync::Arc};

use log::warn;
use parking_lot::Mutex;

use crate::{
    config::DiskCacheConfig,
    entry::{Borrow, CacheEntry, MappedEntry},
    error::{CacheError, Result},
    fingerprint::Fingerprint,
    ordered_map::OrderedFingerprintMap,
};

pub use layout::DiskLayout;

struct State {
    resident: OrderedFingerprintMap<Arc<MappedEntry>>,
    persistent: OrderedFingerprintMap<Arc<MappedEntry>>,
    resident_bytes: u64,
    persistent_bytes: u64,
}

impl State {
    fn empty() -> Self {
        Self {
            resident: OrderedFingerprintMap::new(),
            persistent: OrderedFingerprintMap::new(),
            resident_bytes: 0,
            persistent_bytes: 0,
        }
    }
}

/// A two-tier, content-addressable cache of disk-backed entries.
///
/// `resident_budget` bounds the mapped working set; `total_budget` bounds
/// resident + persistent bytes combined. Both are checked with the
/// lookahead form (`current + incoming > budget`), the first of the two
/// equally-acceptable forms this design names (see `DESIGN.md`).
pub struct DiskCache {
    layout: DiskLayout,
    cache_version: String,
    resident_budget: u64,
    total_budget: u64,
    state: Mutex<State>,
}

impl DiskCache {
    /// Opens (bootstrapping or restoring) the cache rooted at `root`.
    pub fn open(
        root: PathBuf,
        cache_version: impl Into<String>,
        resident_budget: u64,
        total_budget: u64,
    ) -> Result<Self> {
        let layout = DiskLayout::new(root);
        let cache_version = cache_version.into();
        let state = Self::bootstrap(&layout, &cache_version)?;
        Ok(Self {
            layout,
            cache_version,
            resident_budget,
            total_budget,
            state: Mutex::new(state),
        })
    }

    /// Opens a cache using the paths and budgets described by `config`.
    pub fn from_config(config: &DiskCacheConfig) -> Result<Self> {
        Self::open(
            config.root(),
            config.cache_version.clone(),
            config.resident_budget_bytes(),
            config.total_budget_bytes,
        )
    }

    fn bootstrap(layout: &DiskLayout, cache_version: &str) -> Result<State> {
        let mut state = State::empty();

        if !layout.checkpoint_path().exists() {
            layout.create()?;
            return Ok(state);
        }

        if !layout.has_valid_bucket_layout()? {
            layout.wipe_and_recreate()?;
            return Ok(state);
        }

        let data_file_count = layout.data_file_count()?;

        let records = match persistence::restore(&layout.checkpoint_path(), cache_version) {
            persistence::RestoreOutcome::NoCheckpoint => {
                layout.create()?;
                return Ok(state);
            }
            persistence::RestoreOutcome::Corrupt { reason } => {
                warn!("cache index corrupt, recreating cache: {}", reason);
                layout.wipe_and_recreate()?;
                return Ok(state);
            }
            persistence::RestoreOutcome::Entries(records) => records,
        };

        let mut constructed = Vec::with_capacity(records.len());
        for record in records {
            let path = PathBuf::from(&record.path);
            constructed.push((
                Fingerprint(record.fingerprint),
                MappedEntry::unmapped(path, record.size),
            ));
        }

        if constructed.len() != data_file_count {
            warn!(
                "checkpoint entry count {} does not match on-disk file count {}, recreating cache",
                constructed.len(),
                data_file_count
            );
            layout.wipe_and_recreate()?;
            return Ok(State::empty());
        }

        for (fingerprint, entry) in constructed {
            state.persistent_bytes += entry.size();
            state.persistent.insert(fingerprint, Arc::new(entry), false);
        }

        persistence::delete_checkpoint(&layout.checkpoint_path())?;

        Ok(state)
    }

    pub fn layout(&self) -> &DiskLayout {
        &self.layout
    }

    pub fn resident_bytes(&self) -> u64 {
        self.state.lock().resident_bytes
    }

    pub fn persistent_bytes(&self) -> u64 {
        self.state.lock().persistent_bytes
    }

    pub fn resident_len(&self) -> usize {
        self.state.lock().resident.len()
    }

    pub fn persistent_len(&self) -> usize {
        self.state.lock().persistent.len()
    }

    /// Looks `key` up, checking the resident tier first, then the
    /// persistent tier (promoting on hit).
    pub fn get(&self, key: Fingerprint) -> Option<Borrow<MappedEntry>> {
        {
            let mut state = self.state.lock();
            state.resident.touch(key);
            if let Some(entry) = state.resident.lookup(key).cloned() {
                return Some(Borrow::new(entry));
            }
        }

        let entry = {
            let state = self.state.lock();
            state.persistent.lookup(key).cloned()
        }?;

        match entry.reopen() {
            Ok(()) => {
                self.remove_persistent(key);
                self.admit_resident(key, entry.clone());
                Some(Borrow::new(entry))
            }
            Err(_) => {
                self.remove_persistent(key);
                self.unlink(entry.path());
                None
            }
        }
    }

    /// Admits `entry`, a newly allocated, mapped, payload-written
    /// [`MappedEntry`], into the resident tier.
    ///
    /// A fingerprint already present in either tier is left untouched and
    /// `entry` is dropped: duplicate keys are a caller error, but a
    /// concurrent caller losing a race to admit the same fingerprint first
    /// is not a bug, just a wasted allocation.
    ///
    /// Returns `true` if admission demoted or evicted something to make
    /// room.
    pub fn add(&self, key: Fingerprint, entry: Arc<MappedEntry>) -> bool {
        let victim = {
            let mut state = self.state.lock();
            if state.resident.contains(key) || state.persistent.contains(key) {
                return false;
            }
            let must_demote = state.resident_bytes + entry.size() > self.resident_budget;
            state.resident_bytes += entry.size();
            state.resident.insert(key, entry, must_demote)
        };

        match victim {
            Some((victim_key, victim)) => {
                self.cascade_resident_victim(victim_key, victim);
                true
            }
            None => false,
        }
    }

    /// Flushes every resident entry back to the persistent tier, unmapping
    /// each one.
    ///
    /// Bounded against the non-removable-saturation hazard: if a full pass
    /// makes no progress, it stops and logs rather than looping forever.
    pub fn clear_resident(&self) {
        let initial_len = self.state.lock().resident.len();
        let mut consecutive_skips = 0usize;

        loop {
            if initial_len == 0 || consecutive_skips >= initial_len {
                if consecutive_skips > 0 {
                    warn!(
                        "clear_resident: {} resident entries are still referenced, stopping",
                        consecutive_skips
                    );
                }
                break;
            }

            let victim = {
                let mut state = self.state.lock();
                state.resident.evict_oldest()
            };
            let Some((key, entry)) = victim else {
                break;
            };
            {
                let mut state = self.state.lock();
                state.resident_bytes = state.resident_bytes.saturating_sub(entry.size());
            }

            if entry.is_removable() {
                self.demote(key, entry);
                consecutive_skips = 0;
            } else {
                // Can't demote safely while referenced; put it back at the
                // newest end so the next pass tries a different entry.
                let mut state = self.state.lock();
                state.resident_bytes += entry.size();
                state.resident.insert(key, entry, false);
                consecutive_skips += 1;
            }
        }
    }

    /// Flushes the resident tier, unlinks every persistent backing file,
    /// then wipes and reinitializes the directory layout.
    pub fn clear_all(&self) -> Result<()> {
        self.clear_resident();

        let drained: Vec<_> = {
            let mut state = self.state.lock();
            let mut drained = Vec::new();
            while let Some((key, entry)) = state.persistent.evict_oldest() {
                state.persistent_bytes = state.persistent_bytes.saturating_sub(entry.size());
                drained.push((key, entry));
            }
            drained
        };
        for (_, entry) in drained {
            self.unlink(entry.path());
        }

        self.layout.wipe_and_recreate()?;
        Ok(())
    }

    /// Writes the index checkpoint: flushes resident entries to persistent
    /// first, then serializes the persistent tier, oldest to newest.
    pub fn save(&self) -> Result<()> {
        self.clear_resident();

        let records = {
            let state = self.state.lock();
            state
                .persistent
                .oldest()
                .map(|(fp, entry)| persistence::EntryRecord::new(*fp, entry.path(), entry.size()))
                .collect()
        };

        persistence::save(&self.layout.checkpoint_path(), &self.cache_version, records)
    }

    fn admit_resident(&self, key: Fingerprint, entry: Arc<MappedEntry>) -> bool {
        let victim = {
            let mut state = self.state.lock();
            let must_demote = state.resident_bytes + entry.size() > self.resident_budget;
            state.resident_bytes += entry.size();
            state.resident.insert(key, entry, must_demote)
        };

        match victim {
            Some((victim_key, victim)) => {
                self.cascade_resident_victim(victim_key, victim);
                true
            }
            None => false,
        }
    }

    /// Processes a victim evicted from the resident tier: demotes it if
    /// removable, otherwise re-admits it forcing eviction of the
    /// next-oldest entry, repeating until a removable victim is found.
    ///
    /// Bounded against the case where every resident entry is referenced:
    /// `insert(.., must_evict=true)` always returns a victim while the tier
    /// is non-empty, so without a bound this would spin forever. A full
    /// pass that finds nothing removable admits the looping victim back in
    /// without forcing further eviction (the resident budget is exceeded
    /// transiently) and logs a diagnostic instead.
    fn cascade_resident_victim(&self, mut victim_key: Fingerprint, mut victim: Arc<MappedEntry>) {
        let saturation_bound = self.state.lock().resident.len() + 1;
        let mut attempts = 0usize;

        loop {
            {
                let mut state = self.state.lock();
                state.resident_bytes = state.resident_bytes.saturating_sub(victim.size());
            }

            if victim.is_removable() {
                self.demote(victim_key, victim);
                return;
            }

            attempts += 1;
            let size = victim.size();
            let mut state = self.state.lock();
            state.resident_bytes += size;

            if attempts > saturation_bound {
                let err = CacheError::NonRemovableSaturation {
                    count: saturation_bound,
                };
                warn!("{}", err);
                state.resident.insert(victim_key, victim, false);
                return;
            }

            match state.resident.insert(victim_key, victim, true) {
                Some((next_key, next_victim)) => {
                    victim_key = next_key;
                    victim = next_victim;
                    continue;
                }
                None => return,
            }
        }
    }

    /// Unmaps `entry` (keeping its backing file) and admits it into the
    /// persistent tier.
    fn demote(&self, key: Fingerprint, entry: Arc<MappedEntry>) {
        entry.deallocate();
        self.admit_persistent(key, entry);
    }

    /// Processes a victim evicted from the persistent tier: unlinks its
    /// backing file if removable, otherwise re-admits it forcing eviction of
    /// the next-oldest entry, repeating until a removable victim is found.
    ///
    /// Bounded the same way as [`Self::cascade_resident_victim`]: a full
    /// pass that finds nothing removable admits the looping victim back in
    /// beyond budget and logs a diagnostic rather than spinning forever.
    fn admit_persistent(&self, key: Fingerprint, entry: Arc<MappedEntry>) {
        let victim = {
            let mut state = self.state.lock();
            let must_evict = state.persistent_bytes + entry.size() > self.total_budget;
            state.persistent_bytes += entry.size();
            state.persistent.insert(key, entry, must_evict)
        };

        let Some((mut victim_key, mut victim)) = victim else {
            return;
        };

        let saturation_bound = self.state.lock().persistent.len() + 1;
        let mut attempts = 0usize;

        loop {
            {
                let mut state = self.state.lock();
                state.persistent_bytes = state.persistent_bytes.saturating_sub(victim.size());
            }

            if victim.is_removable() {
                self.unlink(victim.path());
                return;
            }

            attempts += 1;
            let size = victim.size();
            let mut state = self.state.lock();
            state.persistent_bytes += size;

            if attempts > saturation_bound {
                let err = CacheError::NonRemovableSaturation {
                    count: saturation_bound,
                };
                warn!("{}", err);
                state.persistent.insert(victim_key, victim, false);
                return;
            }

            match state.persistent.insert(victim_key, victim, true) {
                Some((next_key, next_victim)) => {
                    victim_key = next_key;
                    victim = next_victim;
                    continue;
                }
                None => return,
            }
        }
    }

    fn remove_persistent(&self, key: Fingerprint) -> Option<Arc<MappedEntry>> {
        let mut state = self.state.lock();
        let removed = state.persistent.remove(key);
        if let Some(entry) = &removed {
            state.persistent_bytes = state.persistent_bytes.saturating_sub(entry.size());
        }
        removed
    }

    fn unlink(&self, path: &std::path::Path) {
        if let Err(err) = std::fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to unlink backing file {:?}: {}", path, err);
            }
        }
    }
}
