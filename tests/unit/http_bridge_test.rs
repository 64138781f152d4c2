//! Unit tests for the reqwest-backed download service.
//!
//! Each test runs a throwaway HTTP server on a loopback socket that answers
//! every request with a canned reply.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use dlbridge::services::http_bridge::{raw_codes, HttpDownloadBridge};
use dlbridge::services::native_bridge::{
    completion_channel, BridgeState, BridgeStatus, CompletionReceiver, NativeDownloadBridge,
};
use dlbridge::types::errors::BridgeError;

/// How the canned server ends each reply.
#[derive(Clone, Copy)]
enum Ending {
    Close,
    Hold,
}

/// Serves `reply` to every connection and returns the base URL.
async fn serve(reply: &'static [u8], ending: Ending) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket.write_all(reply).await;
                let _ = socket.flush().await;
                if let Ending::Hold = ending {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });
    format!("http://{}", addr)
}

fn bridge() -> (HttpDownloadBridge, CompletionReceiver) {
    let bridge = HttpDownloadBridge::new(reqwest::Client::new(), Handle::current());
    let (signal, rx) = completion_channel();
    bridge.attach_completion_signal(signal);
    (bridge, rx)
}

async fn next_completion(rx: &mut CompletionReceiver) -> i64 {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no completion signal")
        .expect("completion channel closed")
}

async fn wait_status(
    bridge: &HttpDownloadBridge,
    queue_id: i64,
    done: impl Fn(&BridgeStatus) -> bool,
) -> BridgeStatus {
    for _ in 0..500 {
        let status = bridge.query_status(queue_id).unwrap();
        if done(&status) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("status of {} never matched", queue_id);
}

fn dest(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().to_string()
}

// ─── Completed transfers ───

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_successful_transfer_writes_file_and_signals() {
    let base = serve(
        b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world",
        Ending::Close,
    )
    .await;
    let tmp = TempDir::new().unwrap();
    let path = dest(&tmp, "hello.txt");
    let (bridge, mut rx) = bridge();

    let queue_id = bridge.enqueue(&format!("{}/hello.txt", base), &path).unwrap();
    assert_eq!(next_completion(&mut rx).await, queue_id);

    let status = bridge.query_status(queue_id).unwrap();
    assert_eq!(status.state, BridgeState::Successful);
    assert_eq!((status.received_bytes, status.total_bytes), (11, 11));
    assert_eq!(status.raw_error_code, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello world");

    // Finished files survive removal of the queue entry.
    bridge.remove(queue_id).unwrap();
    assert!(Path::new(&path).exists());
    assert!(matches!(bridge.query_status(queue_id), Err(BridgeError::NotFound(_))));
    assert!(bridge.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_error_status_is_raw_code() {
    let base = serve(
        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        Ending::Close,
    )
    .await;
    let tmp = TempDir::new().unwrap();
    let (bridge, mut rx) = bridge();

    let queue_id = bridge.enqueue(&format!("{}/missing.bin", base), &dest(&tmp, "missing.bin")).unwrap();
    assert_eq!(next_completion(&mut rx).await, queue_id);

    let status = bridge.query_status(queue_id).unwrap();
    assert_eq!(status.state, BridgeState::Failed);
    assert_eq!(status.raw_error_code, 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_truncated_body_fails_and_partial_file_is_removed() {
    let base = serve(
        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n0123456789",
        Ending::Close,
    )
    .await;
    let tmp = TempDir::new().unwrap();
    let path = dest(&tmp, "short.bin");
    let (bridge, mut rx) = bridge();

    let queue_id = bridge.enqueue(&format!("{}/short.bin", base), &path).unwrap();
    assert_eq!(next_completion(&mut rx).await, queue_id);

    let status = bridge.query_status(queue_id).unwrap();
    assert_eq!(status.state, BridgeState::Failed);
    assert!(
        [raw_codes::HTTP_DATA_ERROR, raw_codes::CANNOT_RESUME].contains(&status.raw_error_code),
        "unexpected raw code {}",
        status.raw_error_code
    );

    bridge.remove(queue_id).unwrap();
    assert!(!Path::new(&path).exists());
}

// ─── Removal ───

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remove_stops_running_transfer_and_deletes_file() {
    let base = serve(
        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789",
        Ending::Hold,
    )
    .await;
    let tmp = TempDir::new().unwrap();
    let path = dest(&tmp, "slow.bin");
    let (bridge, mut rx) = bridge();

    let queue_id = bridge.enqueue(&format!("{}/slow.bin", base), &path).unwrap();
    let status = wait_status(&bridge, queue_id, |s| s.received_bytes == 10).await;
    assert_eq!(status.state, BridgeState::Running);
    assert_eq!(status.total_bytes, 100);

    bridge.remove(queue_id).unwrap();
    assert!(!Path::new(&path).exists());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "removed transfer must not signal completion");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remove_unknown_queue_id() {
    let (bridge, _rx) = bridge();
    assert!(matches!(bridge.remove(7), Err(BridgeError::NotFound(7))));
}

// ─── Enqueue validation ───

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_enqueue_rejects_bad_requests() {
    let tmp = TempDir::new().unwrap();
    let (bridge, _rx) = bridge();

    assert!(matches!(
        bridge.enqueue("ftp://host/file.bin", &dest(&tmp, "file.bin")),
        Err(BridgeError::Enqueue(_))
    ));
    assert!(matches!(
        bridge.enqueue("not a url", &dest(&tmp, "file.bin")),
        Err(BridgeError::Enqueue(_))
    ));
    assert!(matches!(bridge.enqueue("http://host/file.bin", "/"), Err(BridgeError::Io(_))));
    assert!(bridge.is_empty());
}
