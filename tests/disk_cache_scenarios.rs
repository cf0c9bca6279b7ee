//! End-to-end scenarios from the design's testable-properties section,
//! exercised against the public API.

use std::sync::{Arc, Barrier};
use std::thread;

use powc_cache::{disk_cache::DiskCache, Fingerprint, MappedEntry};
use tempfile::tempdir;

fn write_entry(root: &std::path::Path, fingerprint: Fingerprint, bytes: &[u8]) -> Arc<MappedEntry> {
    let bucket = root.join(fingerprint.bucket_name());
    std::fs::create_dir_all(&bucket).unwrap();
    let path = bucket.join(fingerprint.file_name());
    let entry = MappedEntry::allocate(path, bytes.len() as u64).unwrap();
    Arc::new(entry)
}

#[test]
fn three_inserts_over_resident_budget_demote_the_oldest() {
    let dir = tempdir().unwrap();
    let cache = DiskCache::open(dir.path().join("cache"), "1", 100, 300).unwrap();
    let root = cache.layout().root().to_path_buf();

    cache.add(Fingerprint(0x01), write_entry(&root, Fingerprint(0x01), &[0u8; 60]));
    cache.add(Fingerprint(0x02), write_entry(&root, Fingerprint(0x02), &[0u8; 60]));
    cache.add(Fingerprint(0x03), write_entry(&root, Fingerprint(0x03), &[0u8; 60]));

    assert_eq!(cache.resident_len() + cache.persistent_len(), 3);
    assert!(cache.persistent_len() >= 1);

    // A get on the demoted entry promotes it back.
    assert!(cache.get(Fingerprint(0x01)).is_some());
}

#[test]
fn fourth_insert_evicts_the_oldest_entirely() {
    let dir = tempdir().unwrap();
    let cache = DiskCache::open(dir.path().join("cache"), "1", 100, 300).unwrap();
    let root = cache.layout().root().to_path_buf();

    for i in 1..=4u64 {
        let fp = Fingerprint(i);
        cache.add(fp, write_entry(&root, fp, &[0u8; 100]));
    }

    assert!(cache.get(Fingerprint(1)).is_none());
    assert!(cache.get(Fingerprint(4)).is_some());
    assert_eq!(cache.resident_bytes() + cache.persistent_bytes(), 300);
}

#[test]
fn referenced_demotion_victim_is_skipped_in_favor_of_the_next_oldest() {
    let dir = tempdir().unwrap();
    let cache = DiskCache::open(dir.path().join("cache"), "1", 50, 300).unwrap();
    let root = cache.layout().root().to_path_buf();

    cache.add(Fingerprint(1), write_entry(&root, Fingerprint(1), &[0u8; 40]));
    let held = cache.get(Fingerprint(1)).unwrap();

    cache.add(Fingerprint(2), write_entry(&root, Fingerprint(2), &[0u8; 40]));

    // 1 is pinned by `held`; it must still be resident.
    assert!(cache.get(Fingerprint(1)).is_some());
    drop(held);
}

#[test]
fn save_then_restore_preserves_persistent_order() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");

    {
        let cache = DiskCache::open(root.clone(), "1", 1000, 1000).unwrap();
        let layout_root = cache.layout().root().to_path_buf();
        cache.add(Fingerprint(0xC), write_entry(&layout_root, Fingerprint(0xC), &[0u8; 10]));
        cache.add(Fingerprint(0xA), write_entry(&layout_root, Fingerprint(0xA), &[0u8; 10]));
        cache.add(Fingerprint(0xB), write_entry(&layout_root, Fingerprint(0xB), &[0u8; 10]));
        cache.save().unwrap();
    }

    let reopened = DiskCache::open(root, "1", 1000, 1000).unwrap();
    assert_eq!(reopened.persistent_len(), 3);
    for fp in [0xC, 0xA, 0xB] {
        assert!(reopened.get(Fingerprint(fp)).is_some());
    }
}

#[test]
fn deleting_a_backing_file_forces_a_wipe_on_restart() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");

    let deleted_path;
    {
        let cache = DiskCache::open(root.clone(), "1", 1000, 1000).unwrap();
        let layout_root = cache.layout().root().to_path_buf();
        cache.add(Fingerprint(1), write_entry(&layout_root, Fingerprint(1), &[0u8; 10]));
        cache.add(Fingerprint(2), write_entry(&layout_root, Fingerprint(2), &[0u8; 10]));
        cache.save().unwrap();
        deleted_path = cache.layout().backing_file_path(Fingerprint(1));
    }

    std::fs::remove_file(&deleted_path).unwrap();

    let reopened = DiskCache::open(root, "1", 1000, 1000).unwrap();
    assert_eq!(reopened.persistent_len(), 0);
}

#[test]
fn sixteen_threads_hammer_a_small_fingerprint_space() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(DiskCache::open(dir.path().join("cache"), "1", 4_096, 65_536).unwrap());
    let root = cache.layout().root().to_path_buf();

    const THREADS: usize = 16;
    const OPS_PER_THREAD: usize = 625; // 16 * 625 = 10_000
    const FINGERPRINT_SPACE: u64 = 256;

    let barrier = Arc::new(Barrier::new(THREADS));
    let mut handles = Vec::new();

    for t in 0..THREADS {
        let cache = Arc::clone(&cache);
        let root = root.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..OPS_PER_THREAD {
                let fp = Fingerprint(((t * OPS_PER_THREAD + i) as u64) % FINGERPRINT_SPACE);
                if let Some(borrow) = cache.get(fp) {
                    drop(borrow);
                } else {
                    let bucket = root.join(fp.bucket_name());
                    std::fs::create_dir_all(&bucket).ok();
                    let path = bucket.join(format!("{}-{}", fp.file_name(), t));
                    if let Ok(entry) = MappedEntry::allocate(path, 32) {
                        cache.add(fp, Arc::new(entry));
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        cache.resident_bytes(),
        cache
            .resident_len() as u64
            * 32
    );
}
