//! Interface to the host download service.
//!
//! The manager treats the service as opaque and unreliable: every call may
//! fail, and completion is reported asynchronously through a
//! [`CompletionSignal`] rather than as the result of a call.

use tokio::sync::mpsc;

use crate::types::errors::BridgeError;

/// State reported by the download service for one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Pending,
    Running,
    Paused,
    Successful,
    Failed,
}

/// One status sample. `raw_error_code` is 0 when no error is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStatus {
    pub state: BridgeState,
    pub received_bytes: u64,
    pub total_bytes: u64,
    pub raw_error_code: i32,
}

/// The host-provided download queue.
pub trait NativeDownloadBridge: Send + Sync {
    /// Queues a transfer of `url` into `dest_path` and returns its queue id.
    fn enqueue(&self, url: &str, dest_path: &str) -> Result<i64, BridgeError>;

    fn query_status(&self, queue_id: i64) -> Result<BridgeStatus, BridgeError>;

    /// Drops the queue entry, stopping the transfer if it is still running.
    fn remove(&self, queue_id: i64) -> Result<(), BridgeError>;

    /// Hands the service the channel on which it announces finished
    /// transfers. Services without push notifications ignore it.
    fn attach_completion_signal(&self, _signal: CompletionSignal) {}
}

/// Sending end of the completion channel. Cheap to clone, callable from any
/// thread.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: mpsc::UnboundedSender<i64>,
}

impl CompletionSignal {
    pub fn notify(&self, queue_id: i64) {
        if self.tx.send(queue_id).is_err() {
            tracing::debug!(queue_id, "completion listener gone");
        }
    }
}

/// Receiving end consumed by the manager's completion listener.
pub type CompletionReceiver = mpsc::UnboundedReceiver<i64>;

pub fn completion_channel() -> (CompletionSignal, CompletionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionSignal { tx }, rx)
}
