//! Memory-mapped file primitive.
//!
//! The cache only needs construct/resize/destroy/path/data from this
//! collaborator. It is implemented here with `memmap2` so the crate is
//! runnable end-to-end, but nothing upstream depends on this being the
//! only possible implementation.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use memmap2::MmapMut;

/// How to treat an existing file at the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePolicy {
    /// Map the file if it exists; create an empty one otherwise.
    KeepIfExistsElseCreate,
    /// Map the file if it exists; fail otherwise.
    KeepIfExistsElseFail,
}

/// An open memory mapping over a backing file.
pub struct MemoryMappedFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl MemoryMappedFile {
    /// Opens (or creates, per `policy`) the file at `path` and maps `size`
    /// bytes of it.
    pub fn open(path: &Path, policy: CreatePolicy, size: u64) -> io::Result<Self> {
        let file = match policy {
            CreatePolicy::KeepIfExistsElseCreate => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?,
            CreatePolicy::KeepIfExistsElseFail => {
                OpenOptions::new().read(true).write(true).open(path)?
            }
        };
        if file.metadata()?.len() < size {
            file.set_len(size)?;
        }
        // SAFETY: the file is owned exclusively by this mapping for its
        // lifetime; no other process maps this cache's directory tree
        // concurrently.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
        })
    }

    /// Grows or shrinks the backing file and remaps it.
    pub fn resize(&mut self, new_size: u64) -> io::Result<()> {
        self.file.set_len(new_size)?;
        // SAFETY: see `open`.
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}
