use criterion::{black_box, criterion_group, criterion_main, Criterion};
use powc_cache::{disk_cache::DiskCache, Fingerprint, MappedEntry, MemoryCache, MemoryEntry};
use std::sync::Arc;
use tempfile::tempdir;

fn memory_cache_add_get(c: &mut Criterion) {
    let cache = MemoryCache::new(64 * 1024 * 1024);
    let mut fp = 0u64;

    c.bench_function("memory_cache_add", |b| {
        b.iter(|| {
            fp += 1;
            let entry = Arc::new(MemoryEntry::new(vec![0u8; 4096]));
            cache.add(Fingerprint(fp), entry);
        })
    });

    c.bench_function("memory_cache_get_hit", |b| {
        cache.add(Fingerprint(0), Arc::new(MemoryEntry::new(vec![0u8; 4096])));
        b.iter(|| black_box(cache.get(Fingerprint(0))))
    });
}

fn disk_cache_admission_cascade(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let cache = DiskCache::open(dir.path().join("bench-cache"), "1", 1 << 20, 16 << 20).unwrap();
    let root = cache.layout().root().to_path_buf();
    let mut fp = 0u64;

    c.bench_function("disk_cache_add_with_demotion", |b| {
        b.iter(|| {
            fp += 1;
            let fingerprint = Fingerprint(fp);
            let bucket = root.join(fingerprint.bucket_name());
            std::fs::create_dir_all(&bucket).unwrap();
            let path = bucket.join(fingerprint.file_name());
            let entry = MappedEntry::allocate(path, 4096).unwrap();
            cache.add(fingerprint, Arc::new(entry));
        })
    });
}

criterion_group!(benches, memory_cache_add_get, disk_cache_admission_cascade);
criterion_main!(benches);
