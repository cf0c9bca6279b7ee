//! The on-disk directory layout: `<cacheRoot>/<cacheName>/{00..ff}/` plus the
//! `restoreFile.powc` checkpoint.

use std::{fs, io, path::{Path, PathBuf}};

use log::{debug, warn};

use crate::fingerprint::Fingerprint;

pub const CHECKPOINT_FILE_NAME: &str = "restoreFile.powc";

/// The cache's root directory plus the bucket directories underneath it.
#[derive(Debug, Clone)]
pub struct DiskLayout {
    root: PathBuf,
}

impl DiskLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join(CHECKPOINT_FILE_NAME)
    }

    pub fn bucket_dir(&self, fingerprint: Fingerprint) -> PathBuf {
        self.root.join(fingerprint.bucket_name())
    }

    pub fn backing_file_path(&self, fingerprint: Fingerprint) -> PathBuf {
        self.bucket_dir(fingerprint).join(fingerprint.file_name())
    }

    /// Creates the root and all 256 bucket directories. Idempotent.
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        for n in 0..Fingerprint::BUCKET_COUNT {
            let dir = self.root.join(format!("{:02x}", n));
            fs::create_dir_all(dir)?;
        }
        debug!(
            "initialized {} bucket directories under {:?}",
            Fingerprint::BUCKET_COUNT,
            self.root
        );
        Ok(())
    }

    /// Number of direct subdirectories currently under the root, or 0 if the
    /// root does not exist.
    pub fn bucket_count(&self) -> io::Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in fs::read_dir(&self.root)? {
            if entry?.file_type()?.is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Number of regular files across all bucket subdirectories (i.e.
    /// backing files actually present on disk, not counting the checkpoint).
    pub fn data_file_count(&self) -> io::Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                for file in fs::read_dir(entry.path())? {
                    if file?.file_type()?.is_file() {
                        count += 1;
                    }
                }
            }
        }
        Ok(count)
    }

    /// Removes the entire cache root and recreates an empty bucket layout.
    /// Used whenever the on-disk state is found to be stale or inconsistent.
    pub fn wipe_and_recreate(&self) -> io::Result<()> {
        if self.root.exists() {
            warn!("wiping cache directory {:?}", self.root);
            fs::remove_dir_all(&self.root)?;
        }
        self.create()
    }

    /// `true` iff exactly [`Fingerprint::BUCKET_COUNT`] bucket directories
    /// exist under the root.
    pub fn has_valid_bucket_layout(&self) -> io::Result<bool> {
        Ok(self.bucket_count()? == Fingerprint::BUCKET_COUNT)
    }
}
