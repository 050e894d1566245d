use hashgen::config::Config;
use hashgen::jobs::SubmitOptions;
use hashgen::service::HashService;
use hashgen::store::{BoundedCache, DurableStore};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use tempfile::tempdir;

fn config_at(path: &std::path::Path) -> Config {
    Config {
        store_path: Some(path.to_path_buf()),
        job_delay_ms: 0,
        cache_capacity: 8,
        ..Config::default()
    }
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("results.jsonl");

    {
        let store = Arc::new(DurableStore::open(&path).unwrap());
        let cache = BoundedCache::new(2, store);
        for i in 0..4u8 {
            cache.add(&format!("job-{i}"), vec![i], vec![i, i]).unwrap();
        }
    }

    let store = Arc::new(DurableStore::open(&path).unwrap());
    assert_eq!(store.len(), 4);
    let cache = BoundedCache::new(2, Arc::clone(&store));
    assert!(cache.is_empty());

    for i in 0..4u8 {
        let record = store.lookup(&format!("job-{i}")).unwrap().unwrap();
        assert_eq!(record.salt, vec![i]);
        assert_eq!(record.digest, vec![i, i]);
    }
}

#[test]
fn test_overwritten_id_replays_latest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("results.jsonl");

    {
        let store = Arc::new(DurableStore::open(&path).unwrap());
        let cache = BoundedCache::new(4, store);
        cache.add("same", Vec::new(), vec![1]).unwrap();
        cache.add("same", Vec::new(), vec![2]).unwrap();
    }

    let store = DurableStore::open(&path).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.lookup("same").unwrap().unwrap().digest, vec![2]);
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
}

#[test]
fn test_torn_tail_is_dropped_and_log_stays_appendable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("results.jsonl");

    {
        let store = Arc::new(DurableStore::open(&path).unwrap());
        BoundedCache::new(4, store)
            .add("kept", Vec::new(), vec![7])
            .unwrap();
    }
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"job_id":"half","sa"#).unwrap();
    drop(file);

    {
        let store = Arc::new(DurableStore::open(&path).unwrap());
        assert!(store.contains("kept"));
        assert!(!store.contains("half"));
        BoundedCache::new(4, store)
            .add("after", Vec::new(), vec![8])
            .unwrap();
    }

    let store = DurableStore::open(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.lookup("after").unwrap().unwrap().digest, vec![8]);
}

#[tokio::test]
async fn test_finished_jobs_readable_after_service_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("results.jsonl");

    let job_id = {
        let service = HashService::open(&config_at(&path)).unwrap();
        let driver = service.spawn_shutdown_driver();
        let job_id = service
            .submit(b"angryMonkey", SubmitOptions::default())
            .unwrap();
        service.request_shutdown();
        service.await_terminated().await;
        driver.await.unwrap();
        job_id
    };

    let service = HashService::open(&config_at(&path)).unwrap();
    assert!(service.cache().is_empty());
    let record = service.get(&job_id).unwrap().unwrap();
    assert_eq!(
        record.encoded_digest(),
        "ZEHhWB65gUlzdVwtDQArEyx-KVLzp_aTaRaPlBzYRIFj6vjFdqEb0Q5B8zVKCZ0vKbZPZklJz0Fd7su2A-gf7Q=="
    );
}
