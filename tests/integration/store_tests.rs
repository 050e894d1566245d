use hashgen::digest;
use hashgen::store::{BoundedCache, DurableStore, ResultRecord, StoreError};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn cache_with_capacity(capacity: usize) -> (tempfile::TempDir, BoundedCache) {
    let dir = tempdir().unwrap();
    let store = DurableStore::open(&dir.path().join("results.jsonl")).unwrap();
    (dir, BoundedCache::new(capacity, Arc::new(store)))
}

#[test]
fn test_add_then_get_returns_record() {
    let (_dir, cache) = cache_with_capacity(10);
    let digest = digest::digest(b"angryMonkey", 0);
    cache.add("job-1", Vec::new(), digest.clone()).unwrap();

    assert_eq!(
        cache.get("job-1"),
        Some(ResultRecord::new("job-1", Vec::new(), digest))
    );
    assert!(cache.get("job-2").is_none());
}

#[test]
fn test_capacity_bound_evicts_oldest_to_store() {
    let (_dir, cache) = cache_with_capacity(3);
    for i in 0..5 {
        cache.add(&format!("job-{i}"), Vec::new(), vec![i as u8]).unwrap();
    }

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.keys_by_recency(), vec!["job-4", "job-3", "job-2"]);
    for evicted in ["job-0", "job-1"] {
        assert!(cache.get(evicted).is_none());
        assert!(cache.store().lookup(evicted).unwrap().is_some());
    }
}

#[test]
fn test_read_refreshes_recency_before_eviction() {
    let (_dir, cache) = cache_with_capacity(2);
    cache.add("a", Vec::new(), vec![1]).unwrap();
    cache.add("b", Vec::new(), vec![2]).unwrap();
    assert!(cache.get("a").is_some());

    cache.add("c", Vec::new(), vec![3]).unwrap();

    assert!(cache.contains("a"));
    assert!(!cache.contains("b"));
    assert!(cache.contains("c"));
}

#[test]
fn test_zero_capacity_uses_default() {
    let (_dir, cache) = cache_with_capacity(0);
    assert_eq!(cache.capacity(), hashgen::store::DEFAULT_CAPACITY);
}

#[test]
fn test_log_lines_are_json_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("results.jsonl");
    let store = Arc::new(DurableStore::open(&path).unwrap());
    let cache = BoundedCache::new(4, store);

    cache.add("first", vec![0xfb, 0xff], vec![1, 2, 3]).unwrap();
    cache.add("second", Vec::new(), vec![4]).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["job_id"], "first");
    assert_eq!(first["salt"], "-_8=");
    assert_eq!(first["digest"], "AQID");
}

#[test]
fn test_corrupt_line_in_middle_refuses_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("results.jsonl");
    let good = serde_json::to_string(&ResultRecord::new("ok", Vec::new(), vec![1])).unwrap();
    fs::write(&path, format!("{good}\nnot json at all\n{good}\n")).unwrap();

    let err = DurableStore::open(&path).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { line: 2, .. }));
}

#[test]
fn test_unwritable_path_is_io_error() {
    let dir = tempdir().unwrap();
    let err = DurableStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));
}
