//! Bounded pool running metadata probes.
//!
//! A fixed number of worker tasks share one bounded queue. Submission uses
//! `try_send`, so a saturated queue is reported to the caller immediately
//! instead of blocking the UI-owning thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};

use crate::types::errors::ProbeError;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a metadata-only request learned about a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeOutcome {
    pub http_status: u16,
    /// 0 when the server did not report a length.
    pub total_bytes: u64,
    pub mime_type: Option<String>,
    /// Filename from `Content-Disposition`, if any.
    pub file_name: Option<String>,
}

impl ProbeOutcome {
    pub fn is_ok(&self) -> bool {
        self.http_status == 200
    }
}

/// Issues the metadata request. Transport failures are returned as
/// [`ProbeError::Protocol`] or [`ProbeError::Connectivity`]; any HTTP reply,
/// including error statuses, is an `Ok` outcome.
pub trait MetadataProbe: Send + Sync {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ProbeOutcome, ProbeError>>;
}

/// One queued probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTask {
    pub guid: String,
    pub url: String,
}

/// Invoked on a worker once a probe has finished.
pub type ProbeCallback = Arc<dyn Fn(ProbeTask, Result<ProbeOutcome, ProbeError>) + Send + Sync>;

/// Handle to the worker pool.
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    tx: mpsc::Sender<ProbeTask>,
}

impl ProbeExecutor {
    /// Spawns `workers` tasks on `handle` sharing a queue of `capacity`.
    pub fn start(
        workers: usize,
        capacity: usize,
        probe: Arc<dyn MetadataProbe>,
        on_done: ProbeCallback,
        handle: &Handle,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<ProbeTask>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            let probe = probe.clone();
            let on_done = on_done.clone();
            handle.spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(task) = next else {
                        break;
                    };
                    tracing::debug!(worker, guid = %task.guid, url = %task.url, "probing");
                    let result = probe.probe(&task.url).await;
                    on_done(task, result);
                }
                tracing::debug!(worker, "probe worker stopped");
            });
        }

        Self { tx }
    }

    /// Queues a probe without waiting.
    ///
    /// # Errors
    /// [`ProbeError::Rejected`] when the queue is full, [`ProbeError::Closed`]
    /// when the workers are gone.
    pub fn submit(&self, task: ProbeTask) -> Result<(), ProbeError> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(rejected)) => {
                tracing::warn!(guid = %rejected.guid, "probe queue full, rejecting");
                Err(ProbeError::Rejected)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ProbeError::Closed),
        }
    }
}
