//! Error types surfaced by this crate.
//!
//! No exceptions escape the cache API: operations internal to admission and
//! eviction keep returning `bool`/`Option<_>` as the design calls for, this
//! type is reserved for the fallible, IO-facing operations (directory
//! bootstrap, index load/save, backing-file allocation) where a caller needs
//! to observe failure.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing file for an entry could not be created or resized.
    #[error("could not allocate backing file {path:?} ({size} bytes)")]
    AllocationFailure { path: PathBuf, size: u64 },

    /// A persistent-tier hit could not remap its backing file on promotion.
    #[error("could not remap backing file {path:?} for promotion")]
    RemapFailure { path: PathBuf },

    /// The on-disk index disagreed with the cache version or the filesystem
    /// state and was wiped and recreated.
    #[error("cache index corrupt, recreating cache: {reason}")]
    IndexCorruption { reason: String },

    /// Eviction could not make progress because every candidate entry is
    /// currently referenced.
    #[error("no evictable entries, all {count} entries are referenced")]
    NonRemovableSaturation { count: usize },

    /// An operation was given a fingerprint already present in the cache.
    #[error("fingerprint {0} is already present in the cache")]
    DuplicateKey(crate::fingerprint::Fingerprint),

    /// Transparent propagation of filesystem failures.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Transparent propagation of index deserialization failures.
    #[error(transparent)]
    Index(#[from] quick_xml::de::DeError),

    /// Transparent propagation of index serialization failures.
    #[error(transparent)]
    IndexSerialize(#[from] quick_xml::se::SeError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
