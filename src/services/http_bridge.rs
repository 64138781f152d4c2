//! In-process download service backed by reqwest.
//!
//! Stands in for a platform download queue: each enqueued request becomes a
//! tokio task streaming the response body into the destination file while a
//! status table records progress. Finished transfers, successful or not,
//! are announced through the attached [`CompletionSignal`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::services::native_bridge::{BridgeState, BridgeStatus, CompletionSignal, NativeDownloadBridge};
use crate::types::errors::BridgeError;

/// Raw codes used by the status table, mirroring the platform service.
pub mod raw_codes {
    pub const FILE_ERROR: i32 = 1001;
    pub const HTTP_DATA_ERROR: i32 = 1004;
    pub const INSUFFICIENT_SPACE: i32 = 1006;
    pub const CANNOT_RESUME: i32 = 1008;
}

const ENOSPC: i32 = 28;

#[derive(Debug)]
struct Transfer {
    status: BridgeStatus,
    dest: PathBuf,
    task: Option<JoinHandle<()>>,
}

type TransferTable = Arc<Mutex<HashMap<i64, Transfer>>>;

fn lock_table(table: &Mutex<HashMap<i64, Transfer>>) -> MutexGuard<'_, HashMap<i64, Transfer>> {
    match table.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("transfer table lock poisoned; continuing with recovered state");
            poisoned.into_inner()
        }
    }
}

/// HTTP download queue running on a tokio runtime.
pub struct HttpDownloadBridge {
    client: reqwest::Client,
    handle: Handle,
    next_id: AtomicI64,
    transfers: TransferTable,
    signal: Arc<OnceLock<CompletionSignal>>,
}

impl HttpDownloadBridge {
    pub fn new(client: reqwest::Client, handle: Handle) -> Self {
        Self {
            client,
            handle,
            next_id: AtomicI64::new(1),
            transfers: Arc::new(Mutex::new(HashMap::new())),
            signal: Arc::new(OnceLock::new()),
        }
    }

    /// Number of queue entries currently known to the service.
    pub fn len(&self) -> usize {
        lock_table(&self.transfers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NativeDownloadBridge for HttpDownloadBridge {
    fn enqueue(&self, url: &str, dest_path: &str) -> Result<i64, BridgeError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| BridgeError::Enqueue(format!("invalid url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BridgeError::Enqueue(format!("unsupported scheme: {}", parsed.scheme())));
        }
        let dest = PathBuf::from(dest_path);
        if dest.file_name().is_none() {
            return Err(BridgeError::Io(format!("destination has no file name: {}", dest_path)));
        }

        let queue_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_table(&self.transfers).insert(
            queue_id,
            Transfer {
                status: BridgeStatus {
                    state: BridgeState::Pending,
                    received_bytes: 0,
                    total_bytes: 0,
                    raw_error_code: 0,
                },
                dest: dest.clone(),
                task: None,
            },
        );

        let task = self.handle.spawn(run_transfer(
            self.client.clone(),
            parsed,
            dest,
            queue_id,
            self.transfers.clone(),
            self.signal.clone(),
        ));
        if let Some(transfer) = lock_table(&self.transfers).get_mut(&queue_id) {
            transfer.task = Some(task);
        }
        tracing::debug!(queue_id, url, dest = dest_path, "transfer queued");
        Ok(queue_id)
    }

    fn query_status(&self, queue_id: i64) -> Result<BridgeStatus, BridgeError> {
        lock_table(&self.transfers)
            .get(&queue_id)
            .map(|t| t.status)
            .ok_or(BridgeError::NotFound(queue_id))
    }

    fn remove(&self, queue_id: i64) -> Result<(), BridgeError> {
        let transfer = lock_table(&self.transfers)
            .remove(&queue_id)
            .ok_or(BridgeError::NotFound(queue_id))?;
        if let Some(task) = transfer.task {
            task.abort();
        }
        if transfer.status.state != BridgeState::Successful && transfer.dest.exists() {
            std::fs::remove_file(&transfer.dest)
                .map_err(|e| BridgeError::Io(format!("failed to delete partial file: {}", e)))?;
        }
        Ok(())
    }

    fn attach_completion_signal(&self, signal: CompletionSignal) {
        if self.signal.set(signal).is_err() {
            tracing::warn!("completion signal already attached");
        }
    }
}

fn set_status(table: &TransferTable, queue_id: i64, update: impl FnOnce(&mut BridgeStatus)) -> bool {
    match lock_table(table).get_mut(&queue_id) {
        Some(transfer) => {
            update(&mut transfer.status);
            true
        }
        None => false,
    }
}

fn io_code(err: &std::io::Error) -> i32 {
    if err.raw_os_error() == Some(ENOSPC) {
        raw_codes::INSUFFICIENT_SPACE
    } else {
        raw_codes::FILE_ERROR
    }
}

async fn run_transfer(
    client: reqwest::Client,
    url: reqwest::Url,
    dest: PathBuf,
    queue_id: i64,
    table: TransferTable,
    signal: Arc<OnceLock<CompletionSignal>>,
) {
    let outcome = stream_to_file(&client, url, &dest, queue_id, &table).await;
    let known = set_status(&table, queue_id, |status| match outcome {
        Ok(()) => status.state = BridgeState::Successful,
        Err(code) => {
            status.state = BridgeState::Failed;
            status.raw_error_code = code;
        }
    });
    if !known {
        return;
    }
    match outcome {
        Ok(()) => tracing::info!(queue_id, dest = %dest.display(), "transfer finished"),
        Err(code) => tracing::warn!(queue_id, code, "transfer failed"),
    }
    if let Some(signal) = signal.get() {
        signal.notify(queue_id);
    }
}

async fn stream_to_file(
    client: &reqwest::Client,
    url: reqwest::Url,
    dest: &Path,
    queue_id: i64,
    table: &TransferTable,
) -> Result<(), i32> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|_| raw_codes::HTTP_DATA_ERROR)?;
    let http_status = response.status();
    if !http_status.is_success() {
        return Err(i32::from(http_status.as_u16()));
    }

    let total = response.content_length().unwrap_or(0);
    set_status(table, queue_id, |status| {
        status.state = BridgeState::Running;
        status.total_bytes = total;
    });

    let mut file = tokio::fs::File::create(dest).await.map_err(|e| io_code(&e))?;
    let mut received = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(|_| raw_codes::HTTP_DATA_ERROR)? {
        file.write_all(&chunk).await.map_err(|e| io_code(&e))?;
        received += chunk.len() as u64;
        set_status(table, queue_id, |status| status.received_bytes = received);
    }
    file.flush().await.map_err(|e| io_code(&e))?;

    if total > 0 && received < total {
        return Err(raw_codes::CANNOT_RESUME);
    }
    Ok(())
}
