use hashgen::config::Config;
use hashgen::error::ServiceError;
use hashgen::jobs::SubmitOptions;
use hashgen::service::HashService;
use hashgen::shutdown::ShutdownState;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

fn service(delay_ms: u64) -> (TempDir, HashService) {
    let dir = tempdir().unwrap();
    let config = Config {
        store_path: Some(dir.path().join("results.jsonl")),
        job_delay_ms: delay_ms,
        ..Config::default()
    };
    (dir, HashService::open(&config).unwrap())
}

#[tokio::test]
async fn test_drain_waits_for_every_admitted_job() {
    let (_dir, service) = service(200);
    let driver = service.spawn_shutdown_driver();

    let ids: Vec<_> = (0..5)
        .map(|i| {
            service
                .submit(format!("secret-{i}").as_bytes(), SubmitOptions::default())
                .unwrap()
        })
        .collect();
    assert_eq!(service.outstanding(), 5);

    let started = Instant::now();
    service.request_shutdown();
    service.await_terminated().await;
    driver.await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(service.outstanding(), 0);
    assert_eq!(service.state(), ShutdownState::Terminated);
    for id in &ids {
        assert!(service.get(id).unwrap().is_some());
    }
}

#[tokio::test]
async fn test_submissions_refused_after_request() {
    let (_dir, service) = service(50);
    let driver = service.spawn_shutdown_driver();
    let admitted = service.submit(b"early", SubmitOptions::salted()).unwrap();

    service.request_shutdown();
    for _ in 0..3 {
        let result = service.submit(b"late", SubmitOptions::default());
        assert!(matches!(result, Err(ServiceError::ServiceUnavailable)));
    }

    service.await_terminated().await;
    driver.await.unwrap();

    assert_eq!(service.cache().len(), 1);
    assert_eq!(service.cache().store().len(), 1);
    let record = service.get(&admitted).unwrap().unwrap();
    assert!(record.is_salted());
}

#[tokio::test]
async fn test_repeated_requests_are_harmless() {
    let (_dir, service) = service(0);
    let driver = service.spawn_shutdown_driver();

    service.request_shutdown();
    service.request_shutdown();
    service.await_terminated().await;
    service.request_shutdown();

    driver.await.unwrap();
    assert_eq!(service.state(), ShutdownState::Terminated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_race_shutdown() {
    let (_dir, service) = service(10);
    let service = std::sync::Arc::new(service);
    let driver = service.spawn_shutdown_driver();

    let submitters: Vec<_> = (0..8)
        .map(|t| {
            let service = std::sync::Arc::clone(&service);
            tokio::spawn(async move {
                let mut accepted = Vec::new();
                for i in 0..50 {
                    match service.submit(format!("{t}-{i}").as_bytes(), SubmitOptions::default()) {
                        Ok(id) => accepted.push(id),
                        Err(ServiceError::ServiceUnavailable) => break,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    tokio::task::yield_now().await;
                }
                accepted
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(5)).await;
    service.request_shutdown();

    let mut accepted = Vec::new();
    for submitter in submitters {
        accepted.extend(submitter.await.unwrap());
    }
    service.await_terminated().await;
    driver.await.unwrap();

    // Every job admitted before the gate closed was stored before termination.
    assert_eq!(service.cache().store().len(), accepted.len());
    for id in &accepted {
        assert!(service.cache().store().contains(id));
    }
}
