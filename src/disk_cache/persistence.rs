//! Index checkpoint: save and restore of the persistent-tier fingerprint set.

use std::{fs, path::Path};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{error::Result, fingerprint::Fingerprint};

/// Root element of the checkpoint document: `<CacheEntries Version="...">`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "CacheEntries")]
pub struct CacheEntriesDocument {
    #[serde(rename = "@Version")]
    pub version: String,
    #[serde(rename = "Entry", default)]
    pub entries: Vec<EntryRecord>,
}

/// One `<Entry .../>` element. `path` and `size` are the only fields this
/// core reads back; additional subclass-defined attributes round-trip
/// through serde's flattening but are not interpreted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    #[serde(rename = "@fingerprint")]
    pub fingerprint: u64,
    #[serde(rename = "@path")]
    pub path: String,
    #[serde(rename = "@size")]
    pub size: u64,
}

impl EntryRecord {
    pub fn new(fingerprint: Fingerprint, path: &Path, size: u64) -> Self {
        Self {
            fingerprint: fingerprint.0,
            path: path.to_string_lossy().into_owned(),
            size,
        }
    }
}

/// Writes `entries` (already in oldest-to-newest order) to `checkpoint_path`
/// as a `CacheEntries` document, truncating any existing file.
pub fn save(
    checkpoint_path: &Path,
    version: &str,
    entries: Vec<EntryRecord>,
) -> Result<()> {
    let document = CacheEntriesDocument {
        version: version.to_string(),
        entries,
    };
    let xml = quick_xml::se::to_string(&document)?;
    fs::write(checkpoint_path, xml)?;
    debug!(
        "wrote checkpoint {:?} ({} entries)",
        checkpoint_path,
        document.entries.len()
    );
    Ok(())
}

/// Outcome of parsing a checkpoint, before the caller reconciles it against
/// the on-disk file count.
pub enum RestoreOutcome {
    /// No checkpoint file exists; caller should (re)create an empty layout.
    NoCheckpoint,
    /// Checkpoint existed but failed to parse or had a mismatched version;
    /// caller should wipe and recreate.
    Corrupt { reason: String },
    /// Checkpoint parsed cleanly.
    Entries(Vec<EntryRecord>),
}

/// Reads and parses the checkpoint at `checkpoint_path`, validating its
/// `Version` attribute against `expected_version`.
pub fn restore(checkpoint_path: &Path, expected_version: &str) -> RestoreOutcome {
    let xml = match fs::read_to_string(checkpoint_path) {
        Ok(xml) => xml,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return RestoreOutcome::NoCheckpoint,
        Err(err) => {
            warn!("could not read checkpoint {:?}: {}", checkpoint_path, err);
            return RestoreOutcome::Corrupt {
                reason: err.to_string(),
            };
        }
    };

    let document: CacheEntriesDocument = match quick_xml::de::from_str(&xml) {
        Ok(document) => document,
        Err(err) => {
            warn!("checkpoint {:?} failed to parse: {}", checkpoint_path, err);
            return RestoreOutcome::Corrupt {
                reason: err.to_string(),
            };
        }
    };

    if document.version != expected_version {
        warn!(
            "checkpoint version {:?} does not match expected {:?}",
            document.version, expected_version
        );
        return RestoreOutcome::Corrupt {
            reason: format!(
                "version mismatch: found {:?}, expected {:?}",
                document.version, expected_version
            ),
        };
    }

    RestoreOutcome::Entries(document.entries)
}

/// Deletes the checkpoint file, if present (it is rewritten on next save).
pub fn delete_checkpoint(checkpoint_path: &Path) -> Result<()> {
    match fs::remove_file(checkpoint_path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
