//! Integration tests for the worker server over real TCP connections.
//!
//! These tests validate that:
//! - Queries without the `grep` prefix are answered with the rejection
//!   literal and never executed.
//! - A slow client cannot hold a handler past the read deadline, and does not
//!   block other clients.
//! - The connection limit and shutdown behave as configured.


use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use dgrep::error::DgrepError;
use dgrep::protocol::REJECTION_RESPONSE;
use dgrep::server::Server;
use test_harness::{test_server_config, write_access_log, TestWorker};

/// Send a raw query and read the whole response
async fn send_query(worker: &TestWorker, query: &str) -> String {
    let mut stream = TcpStream::connect(worker.addr).await.unwrap();
    stream.write_all(query.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_rejects_many_concurrent_clients() {
    let worker = TestWorker::start().await;

    let mut clients = Vec::new();
    for _ in 0..15 {
        let addr = worker.addr;
        clients.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"pwd\n").await.unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            String::from_utf8(response).unwrap()
        }));
    }

    for client in clients {
        assert_eq!(client.await.unwrap(), REJECTION_RESPONSE);
    }
}

#[tokio::test]
async fn test_rejected_query_has_no_side_effects() {
    let worker = TestWorker::start().await;
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");

    let response = send_query(&worker, &format!("echo hi > {}", marker.display())).await;
    assert_eq!(response, REJECTION_RESPONSE);

    let response = send_query(&worker, &format!("touch {}", marker.display())).await;
    assert_eq!(response, REJECTION_RESPONSE);

    assert!(!marker.exists(), "rejected query must not run");
}

#[tokio::test]
async fn test_counts_lines_in_log() {
    let worker = TestWorker::start().await;
    let dir = tempfile::tempdir().unwrap();
    let log = write_access_log(dir.path());

    let response = send_query(&worker, &format!("grep -c '' {}", log.display())).await;
    assert_eq!(response, "1000");
}

#[tokio::test]
async fn test_response_is_trimmed() {
    let worker = TestWorker::start().await;

    // The prefix check is bytewise, so the shell runs the printf after grep
    let response = send_query(&worker, "grep -q x /dev/null; printf '  171\\n'").await;
    assert_eq!(response, "171");
}

#[tokio::test]
async fn test_failed_command_still_responds() {
    let worker = TestWorker::start().await;

    let response = send_query(&worker, "grep -c x /nonexistent/file-12345").await;
    assert_eq!(response, "");
}

#[tokio::test]
async fn test_slow_client_is_disconnected() {
    let config = test_server_config().with_read_timeout_ms(200);
    let worker = TestWorker::start_with(config).await;

    let mut stream = TcpStream::connect(worker.addr).await.unwrap();
    let start = Instant::now();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let elapsed = start.elapsed();

    assert!(response.is_empty(), "no response without a query");
    assert!(
        elapsed < Duration::from_secs(2),
        "server should close at the read deadline (took {:?})",
        elapsed
    );
}

#[tokio::test]
async fn test_slow_client_does_not_block_others() {
    let config = test_server_config().with_read_timeout_ms(5000);
    let worker = TestWorker::start_with(config).await;

    // Holds a handler waiting for a query that never comes
    let _idle = TcpStream::connect(worker.addr).await.unwrap();

    let start = Instant::now();
    let response = send_query(&worker, "grep -c x /dev/null").await;
    assert_eq!(response, "0");
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "accept loop must not wait on the idle handler"
    );
}

#[tokio::test]
async fn test_connection_limit_queues_clients() {
    let config = test_server_config()
        .with_max_connections(1)
        .with_read_timeout_ms(300);
    let worker = TestWorker::start_with(config).await;

    // Occupies the only permit until its read deadline expires
    let _idle = TcpStream::connect(worker.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    let response = send_query(&worker, "grep -c x /dev/null").await;
    let elapsed = start.elapsed();

    assert_eq!(response, "0");
    assert!(
        elapsed >= Duration::from_millis(200),
        "second client should wait for the permit (took {:?})",
        elapsed
    );
}

#[tokio::test]
async fn test_shutdown_stops_accept_loop() {
    let worker = TestWorker::start().await;
    let addr = worker.addr;
    assert_eq!(send_query(&worker, "echo hi").await, REJECTION_RESPONSE);

    let result = tokio::time::timeout(Duration::from_secs(5), worker.stop())
        .await
        .expect("run should return after shutdown");
    assert!(result.is_ok());

    assert!(
        TcpStream::connect(addr).await.is_err(),
        "listener should be closed after shutdown"
    );
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_query() {
    let worker = TestWorker::start().await;
    let addr = worker.addr;

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"grep -q x /dev/null; sleep 1; echo done")
            .await
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    });

    // Let the handler pick up the query before shutting down
    tokio::time::sleep(Duration::from_millis(300)).await;

    let start = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(5), worker.stop())
        .await
        .expect("run should return once the handler finishes");
    let elapsed = start.elapsed();

    assert!(result.is_ok());
    assert!(
        elapsed >= Duration::from_millis(300),
        "run should wait for the in-flight handler (took {:?})",
        elapsed
    );
    assert_eq!(client.await.unwrap(), "done");
}

#[tokio::test]
async fn test_shutdown_gives_up_after_drain_timeout() {
    let config = test_server_config().with_drain_timeout_ms(200);
    let worker = TestWorker::start_with(config).await;
    let addr = worker.addr;

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"grep -q x /dev/null; sleep 5; echo late")
            .await
            .unwrap();
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
    });

    tokio::time::sleep(Duration::from_millis(300)).await;

    let start = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(3), worker.stop())
        .await
        .expect("run should return at the drain timeout");
    let elapsed = start.elapsed();

    assert!(result.is_ok());
    assert!(
        elapsed >= Duration::from_millis(150),
        "run should wait for the drain timeout (took {:?})",
        elapsed
    );
    assert!(
        elapsed < Duration::from_secs(2),
        "run should not wait for the handler past the drain timeout (took {:?})",
        elapsed
    );

    client.abort();
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let worker = TestWorker::start().await;

    let config = dgrep::config::ServerConfig::new(worker.addr);
    let err = Server::bind(config).await.err().expect("second bind should fail");

    match err {
        DgrepError::Bind { addr, .. } => assert_eq!(addr, worker.addr),
        other => panic!("expected bind error, got {other:?}"),
    }
}
