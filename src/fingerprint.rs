//! The opaque 64-bit key under which cache entries are addressed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 64-bit content-addressing key.
///
/// Uniqueness within a single cache instance is assumed; the function that
/// produces these values is an external collaborator and is not part of this
/// crate. Ordering is the natural ordering of the wrapped integer, which is
/// only used to derive a stable bucket directory, never for cache recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Number of bucket directories the disk cache fans its files out into.
    pub const BUCKET_COUNT: usize = 256;

    /// Returns the low byte of the fingerprint, used to pick a bucket
    /// directory (`00`..`ff`) for the backing file.
    pub fn bucket(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// Renders the bucket as the two lowercase hex characters used for the
    /// directory name.
    pub fn bucket_name(self) -> String {
        format!("{:02x}", self.bucket())
    }

    /// A filename derived from the full fingerprint, used as the default
    /// backing file name for entries that don't need a subclass-chosen name.
    pub fn file_name(self) -> String {
        format!("{:016x}", self.0)
    }
}

impl From<u64> for Fingerprint {
    fn from(v: u64) -> Self {
        Fingerprint(v)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_is_low_byte() {
        let fp = Fingerprint(0x1234_5678_9abc_def0);
        assert_eq!(fp.bucket(), 0xf0);
        assert_eq!(fp.bucket_name(), "f0");
    }

    #[test]
    fn bucket_name_is_two_lowercase_hex_chars() {
        for v in [0u64, 1, 15, 16, 255, 256, u64::MAX] {
            let name = Fingerprint(v).bucket_name();
            assert_eq!(name.len(), 2);
            assert!(name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
