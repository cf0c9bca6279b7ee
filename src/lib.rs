//! A two-tier, content-addressable cache for large immutable byte blobs.
//!
//! [`memory_cache::MemoryCache`] is a pure heap-resident cache. [`disk_cache::DiskCache`]
//! adds a much larger, budget-capped persistent tier backed by memory-mapped
//! files, over a smaller bounded resident (mapped) working set; entries move
//! between the two tiers as admission and lookups demand (demotion,
//! promotion, eviction).
//!
//! Fingerprints, payload codecs, and the memory-mapped file primitive's
//! exact shape are the caller's concern; this crate owns only the
//! admission/eviction machinery, the entry lifecycle, and the on-disk
//! layout and index that make the persistent tier durable across restarts.

pub mod config;
pub mod disk_cache;
pub mod entry;
pub mod error;
pub mod fingerprint;
pub mod memory_cache;
pub mod mmap_file;
pub mod ordered_map;

pub use config::{CacheConfig, DiskCacheConfig};
pub use disk_cache::DiskCache;
pub use entry::{Borrow, CacheEntry, MappedEntry, MemoryEntry};
pub use error::{CacheError, Result};
pub use fingerprint::Fingerprint;
pub use memory_cache::MemoryCache;

/// Installs `env_logger` as the global logger, reading `RUST_LOG` as usual.
///
/// Binaries and tests that want eager, zero-configuration logging can call
/// this once at startup; library consumers that already run their own
/// logger should not call it. Gated the same way the teacher crate gates its
/// own eager initializer.
#[cfg(feature = "init_env_logger")]
pub fn init_env_logger() {
    let _ = env_logger::try_init();
}
