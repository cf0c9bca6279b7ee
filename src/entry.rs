//! The unit managed by a cache: [`MemoryEntry`] for the pure in-memory
//! cache, [`MappedEntry`] for the disk-backed one.
//!
//! Both are closed, concrete types rather than a single type distinguished
//! at runtime: the resident/persistent tiers are generic over whichever one
//! they hold, so the cache never needs to probe "is this one mapped?" the
//! way the original implementation did with a dynamic cast.

use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, MutexGuard};

use crate::{
    error::{CacheError, Result},
    mmap_file::{CreatePolicy, MemoryMappedFile},
};

/// Reference-count and pin bookkeeping shared by both entry kinds.
///
/// Guarded by the entry's per-entry mutex; the cache acquires this mutex
/// before any destructive operation (deallocate, reopen, drop), and clients
/// briefly touch it through [`CacheEntry::add_reference`] /
/// [`CacheEntry::release_reference`] when taking and releasing a borrow.
#[derive(Debug, Default)]
struct LifecycleState {
    ref_count: u32,
    pinned: bool,
}

impl LifecycleState {
    fn is_removable(&self) -> bool {
        self.ref_count == 0 && !self.pinned
    }
}

/// Common contract the caches need from an entry, regardless of kind.
pub trait CacheEntry: Send + Sync {
    /// Byte count contributing to budget accounting. Fixed at construction.
    fn size(&self) -> u64;

    /// No outstanding borrows and no subclass-specific pin: safe to demote
    /// or evict.
    fn is_removable(&self) -> bool;

    fn add_reference(&self);

    fn release_reference(&self);

    fn pin(&self);

    fn unpin(&self);
}

/// A heap-resident cache payload, used by [`crate::memory_cache::MemoryCache`].
pub struct MemoryEntry {
    size: u64,
    data: Box<[u8]>,
    state: Mutex<LifecycleState>,
}

impl MemoryEntry {
    pub fn new(data: impl Into<Box<[u8]>>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            data,
            state: Mutex::new(LifecycleState::default()),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl CacheEntry for MemoryEntry {
    fn size(&self) -> u64 {
        self.size
    }

    fn is_removable(&self) -> bool {
        self.state.lock().is_removable()
    }

    fn add_reference(&self) {
        self.state.lock().ref_count += 1;
    }

    fn release_reference(&self) {
        let mut state = self.state.lock();
        state.ref_count = state.ref_count.saturating_sub(1);
    }

    fn pin(&self) {
        self.state.lock().pinned = true;
    }

    fn unpin(&self) {
        self.state.lock().pinned = false;
    }
}

/// Lifecycle state specific to a [`MappedEntry`]: the reference/pin counters
/// plus the mapping handle, which is `Some` iff the entry is resident (I4).
struct MappedState {
    lifecycle: LifecycleState,
    mapping: Option<MemoryMappedFile>,
}

/// A disk-backed cache payload, used by [`crate::disk_cache::DiskCache`].
///
/// The path is stable across demotion/promotion and lives outside the
/// per-entry mutex since it never changes after construction; the mapping
/// handle comes and goes as the entry is demoted and promoted, so it lives
/// inside the mutex alongside the reference/pin counters.
pub struct MappedEntry {
    size: u64,
    path: PathBuf,
    state: Mutex<MappedState>,
}

impl MappedEntry {
    /// Creates a new backing file at `path`, sized to `size` bytes, mapped
    /// and ready for the caller to write its payload into before handing
    /// the entry to the cache's `add`.
    ///
    /// On failure the partial file is removed and no entry is constructed.
    pub fn allocate(path: PathBuf, size: u64) -> Result<Self> {
        match MemoryMappedFile::open(&path, CreatePolicy::KeepIfExistsElseCreate, size) {
            Ok(mapping) => Ok(Self {
                size,
                path,
                state: Mutex::new(MappedState {
                    lifecycle: LifecycleState::default(),
                    mapping: Some(mapping),
                }),
            }),
            Err(_) => {
                let _ = std::fs::remove_file(&path);
                Err(CacheError::AllocationFailure { path, size })
            }
        }
    }

    /// Reconstructs a descriptor for an entry whose backing file already
    /// exists on disk (restore) or is already known to be persistent-only
    /// (demotion). The descriptor starts unmapped; call `reopen` to promote.
    pub fn unmapped(path: PathBuf, size: u64) -> Self {
        Self {
            size,
            path,
            state: Mutex::new(MappedState {
                lifecycle: LifecycleState::default(),
                mapping: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_mapped(&self) -> bool {
        self.state.lock().mapping.is_some()
    }

    /// Read access to the mapped payload. Panics if called while unmapped;
    /// callers must promote (reopen) before reading a persistent-tier entry.
    pub fn data(&self) -> MappedDataGuard<'_> {
        MappedDataGuard {
            guard: self.state.lock(),
        }
    }

    /// Unmaps the backing file, retaining it on disk. Used on demotion.
    pub(crate) fn deallocate(&self) {
        self.state.lock().mapping = None;
    }

    /// Re-establishes the mapping from `path`. Used on promotion (a
    /// persistent-tier hit). Fails if the file is missing or can't be
    /// mapped; the caller evicts the entry entirely.
    pub(crate) fn reopen(&self) -> Result<()> {
        let mapping = MemoryMappedFile::open(&self.path, CreatePolicy::KeepIfExistsElseFail, self.size)
            .map_err(|_| CacheError::RemapFailure {
                path: self.path.clone(),
            })?;
        self.state.lock().mapping = Some(mapping);
        Ok(())
    }
}

impl CacheEntry for MappedEntry {
    fn size(&self) -> u64 {
        self.size
    }

    fn is_removable(&self) -> bool {
        self.state.lock().lifecycle.is_removable()
    }

    fn add_reference(&self) {
        self.state.lock().lifecycle.ref_count += 1;
    }

    fn release_reference(&self) {
        let mut state = self.state.lock();
        state.lifecycle.ref_count = state.lifecycle.ref_count.saturating_sub(1);
    }

    fn pin(&self) {
        self.state.lock().lifecycle.pinned = true;
    }

    fn unpin(&self) {
        self.state.lock().lifecycle.pinned = false;
    }
}

pub struct MappedDataGuard<'a> {
    guard: MutexGuard<'a, MappedState>,
}

impl Deref for MappedDataGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.guard
            .mapping
            .as_ref()
            .expect("mapped entry payload accessed while unmapped")
            .as_slice()
    }
}

/// A client's hold on an admitted entry: a strong reference plus an
/// incremented reference count.
///
/// The specification describes clients holding "a pointer plus a held
/// per-entry lock and an incremented reference count, released explicitly".
/// Here the reference count *is* the protection the rest of the design
/// relies on (a referenced entry is never removable, see
/// [`CacheEntry::is_removable`]); the per-entry mutex itself is only taken
/// for the short, ordinary critical sections around lifecycle transitions,
/// not held for the borrow's whole lifetime. `release` is provided for
/// callers that want to say so explicitly; dropping the borrow does the
/// same thing.
pub struct Borrow<E: CacheEntry> {
    entry: Arc<E>,
}

impl<E: CacheEntry> Borrow<E> {
    pub(crate) fn new(entry: Arc<E>) -> Self {
        entry.add_reference();
        Self { entry }
    }

    pub fn release(self) {
        // Drop performs the release; this makes the call site explicit.
    }
}

impl<E: CacheEntry> Deref for Borrow<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entry
    }
}

impl<E: CacheEntry> Drop for Borrow<E> {
    fn drop(&mut self) {
        self.entry.release_reference();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_entry_is_removable_until_referenced() {
        let entry = Arc::new(MemoryEntry::new(vec![0u8; 16]));
        assert!(entry.is_removable());
        let borrow = Borrow::new(entry.clone());
        assert!(!entry.is_removable());
        drop(borrow);
        assert!(entry.is_removable());
    }

    #[test]
    fn pinned_entry_is_never_removable() {
        let entry = MemoryEntry::new(vec![1u8; 4]);
        entry.pin();
        assert!(!entry.is_removable());
        entry.unpin();
        assert!(entry.is_removable());
    }

    #[test]
    fn release_can_be_called_explicitly() {
        let entry = Arc::new(MemoryEntry::new(vec![0u8; 4]));
        let borrow = Borrow::new(entry.clone());
        borrow.release();
        assert!(entry.is_removable());
    }
}
