//! Configuration layer: the parameters a deployer actually tunes, with
//! sensible defaults and an optional environment-backed loader.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

fn default_cache_name() -> String {
    "powc".to_string()
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_cache_version() -> String {
    "1".to_string()
}

fn default_bucket_count() -> usize {
    Fingerprint::BUCKET_COUNT
}

/// Parameters for the pure in-memory cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget for the single tier.
    pub budget_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Parameters for the disk-backed cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskCacheConfig {
    /// Logical cache name; forms the final path component under
    /// `cache_root`.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Root directory under which `cache_name` is created. Defaults to the
    /// platform per-user cache directory.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Version string written to and checked against the checkpoint's
    /// `Version` attribute; bumping it discards an incompatible on-disk
    /// index.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Fraction of `total_budget_bytes` that may be resident (mapped) at
    /// once, in `(0, 1]`.
    pub resident_fraction: f64,

    /// Byte budget across the resident and persistent tiers combined.
    pub total_budget_bytes: u64,

    /// Number of bucket subdirectories. Always [`Fingerprint::BUCKET_COUNT`]
    /// in production; kept configurable only so tests can shrink it.
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            cache_root: default_cache_root(),
            cache_version: default_cache_version(),
            resident_fraction: 0.1,
            total_budget_bytes: 4 * 1024 * 1024 * 1024,
            bucket_count: default_bucket_count(),
        }
    }
}

impl DiskCacheConfig {
    /// The cache root joined with the cache name: the directory the
    /// bucket layout is created under.
    pub fn root(&self) -> PathBuf {
        self.cache_root.join(&self.cache_name)
    }

    /// `total_budget_bytes * resident_fraction`, rounded down.
    pub fn resident_budget_bytes(&self) -> u64 {
        (self.total_budget_bytes as f64 * self.resident_fraction) as u64
    }
}

#[cfg(feature = "figment_config")]
mod figment_loader {
    use super::DiskCacheConfig;
    use figment::{
        providers::{Env, Serialized},
        Figment,
    };

    /// Loads a [`DiskCacheConfig`], starting from [`DiskCacheConfig::default`]
    /// and overlaying any `POWC_*` environment variables.
    pub fn load_disk_cache_config() -> Result<DiskCacheConfig, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(DiskCacheConfig::default()))
            .merge(Env::prefixed("POWC_"))
            .extract()
    }
}

#[cfg(feature = "figment_config")]
pub use figment_loader::load_disk_cache_config;
