use hashgen::config::Config;
use hashgen::server;
use hashgen::service::HashService;
use hashgen::shutdown::ShutdownState;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn http(addr: std::net::SocketAddr, request: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

fn post_hash(password: &str) -> String {
    let body = format!("password={password}");
    format!(
        "POST /hash HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
         Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

fn body(response: &str) -> &str {
    response.split("\r\n\r\n").nth(1).unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serve_submit_poll_and_drain() {
    let dir = tempdir().unwrap();
    let config = Config {
        store_path: Some(dir.path().join("results.jsonl")),
        job_delay_ms: 500,
        ..Config::default()
    };
    let service = Arc::new(HashService::open(&config).unwrap());
    let driver = service.spawn_shutdown_driver();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(server::serve(Arc::clone(&service), listener));

    let response = http(addr, post_hash("angryMonkey")).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    let job_id = body(&response).trim_end().to_string();

    let pending = http(addr, get(&format!("/hash/{job_id}"))).await;
    assert!(pending.starts_with("HTTP/1.1 404"));

    service.request_shutdown();
    let refused = http(addr, post_hash("late")).await;
    assert!(refused.starts_with("HTTP/1.1 503"));
    assert_eq!(body(&refused), "Error: service shutdown pending\n");

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    driver.await.unwrap();
    assert_eq!(service.state(), ShutdownState::Terminated);

    let record = service.get(&job_id).unwrap().unwrap();
    assert_eq!(
        record.encoded_digest(),
        "ZEHhWB65gUlzdVwtDQArEyx-KVLzp_aTaRaPlBzYRIFj6vjFdqEb0Q5B8zVKCZ0vKbZPZklJz0Fd7su2A-gf7Q=="
    );
}
