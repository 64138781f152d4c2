//! Test doubles shared by the download manager and RPC tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use dlbridge::managers::download_manager::DownloadManager;
use dlbridge::services::event_bus::DownloadEventSink;
use dlbridge::services::native_bridge::{BridgeState, BridgeStatus, NativeDownloadBridge};
use dlbridge::services::probe_executor::{BoxFuture, MetadataProbe, ProbeOutcome};
use dlbridge::types::download::DownloadItemView;
use dlbridge::types::errors::{BridgeError, ProbeError};
use dlbridge::types::settings::DownloadSettings;

// ─── Bridge ───

type EnqueueHook = Box<dyn Fn(i64) + Send + Sync>;

/// Scriptable download service: tests set the status each queue id reports.
#[derive(Default)]
pub struct MockBridge {
    next_id: AtomicI64,
    statuses: Mutex<HashMap<i64, BridgeStatus>>,
    enqueued: Mutex<Vec<(String, String)>>,
    removed: Mutex<Vec<i64>>,
    fail_enqueue: AtomicBool,
    on_enqueue: Mutex<Option<EnqueueHook>>,
}

impl MockBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, queue_id: i64, state: BridgeState, received: u64, total: u64, raw: i32) {
        self.statuses.lock().unwrap().insert(
            queue_id,
            BridgeStatus {
                state,
                received_bytes: received,
                total_bytes: total,
                raw_error_code: raw,
            },
        );
    }

    /// Forgets `queue_id` so status queries for it fail.
    pub fn drop_status(&self, queue_id: i64) {
        self.statuses.lock().unwrap().remove(&queue_id);
    }

    pub fn fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    /// Runs `hook` with the new queue id just before `enqueue` returns.
    pub fn on_enqueue(&self, hook: impl Fn(i64) + Send + Sync + 'static) {
        *self.on_enqueue.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn enqueued(&self) -> Vec<(String, String)> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<i64> {
        self.removed.lock().unwrap().clone()
    }
}

impl NativeDownloadBridge for MockBridge {
    fn enqueue(&self, url: &str, dest_path: &str) -> Result<i64, BridgeError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(BridgeError::Enqueue("queue unavailable".to_string()));
        }
        let queue_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.enqueued
            .lock()
            .unwrap()
            .push((url.to_string(), dest_path.to_string()));
        self.set_status(queue_id, BridgeState::Pending, 0, 0, 0);
        if let Some(hook) = self.on_enqueue.lock().unwrap().as_ref() {
            hook(queue_id);
        }
        Ok(queue_id)
    }

    fn query_status(&self, queue_id: i64) -> Result<BridgeStatus, BridgeError> {
        self.statuses
            .lock()
            .unwrap()
            .get(&queue_id)
            .copied()
            .ok_or(BridgeError::NotFound(queue_id))
    }

    fn remove(&self, queue_id: i64) -> Result<(), BridgeError> {
        self.removed.lock().unwrap().push(queue_id);
        self.statuses
            .lock()
            .unwrap()
            .remove(&queue_id)
            .map(|_| ())
            .ok_or(BridgeError::NotFound(queue_id))
    }
}

// ─── Probe ───

pub enum ProbeScript {
    Reply(ProbeOutcome),
    Unreachable,
    Malformed,
}

/// Probe that answers every URL the same way, optionally held behind a gate.
pub struct MockProbe {
    script: ProbeScript,
    gate: Option<Arc<Semaphore>>,
    pub started: AtomicUsize,
}

impl MockProbe {
    pub fn ok(total_bytes: u64, mime: &str) -> Arc<Self> {
        Self::scripted(ProbeScript::Reply(ProbeOutcome {
            http_status: 200,
            total_bytes,
            mime_type: Some(mime.to_string()),
            file_name: None,
        }))
    }

    pub fn scripted(script: ProbeScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            gate: None,
            started: AtomicUsize::new(0),
        })
    }

    /// Holds every probe until permits are added to the returned semaphore.
    pub fn gated(total_bytes: u64) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let probe = Arc::new(Self {
            script: ProbeScript::Reply(ProbeOutcome {
                http_status: 200,
                total_bytes,
                mime_type: None,
                file_name: None,
            }),
            gate: Some(gate.clone()),
            started: AtomicUsize::new(0),
        });
        (probe, gate)
    }
}

impl MetadataProbe for MockProbe {
    fn probe<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<ProbeOutcome, ProbeError>> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            match &self.script {
                ProbeScript::Reply(outcome) => Ok(outcome.clone()),
                ProbeScript::Unreachable => Err(ProbeError::Connectivity("connection refused".to_string())),
                ProbeScript::Malformed => Err(ProbeError::Protocol("invalid header".to_string())),
            }
        })
    }
}

// ─── Sink ───

/// Records every delivered event as `(name, item)`.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(&'static str, DownloadItemView)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, name: &'static str, item: &DownloadItemView) {
        self.events.lock().unwrap().push((name, item.clone()));
    }

    pub fn events_for(&self, guid: &str) -> Vec<(&'static str, DownloadItemView)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, item)| item.guid == guid)
            .cloned()
            .collect()
    }

    pub fn names_for(&self, guid: &str) -> Vec<&'static str> {
        self.events_for(guid).into_iter().map(|(name, _)| name).collect()
    }

    pub fn last_for(&self, guid: &str, name: &str) -> Option<DownloadItemView> {
        self.events_for(guid)
            .into_iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, item)| item)
    }

    pub fn count(&self, guid: &str, name: &str) -> usize {
        self.names_for(guid).iter().filter(|n| **n == name).count()
    }

    /// Waits up to two seconds for `name` to be delivered for `guid`.
    pub async fn wait_for(&self, guid: &str, name: &str) -> DownloadItemView {
        for _ in 0..400 {
            if let Some(item) = self.last_for(guid, name) {
                return item;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no {} event for {}: saw {:?}", name, guid, self.names_for(guid));
    }

    /// Gives the dispatcher time to drain anything still queued.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

impl DownloadEventSink for RecordingSink {
    fn on_before_download(&self, _owner_id: i64, item: &DownloadItemView) {
        self.record("before", item);
    }

    fn on_download_updated(&self, _owner_id: i64, item: &DownloadItemView) {
        self.record("updated", item);
    }

    fn on_download_failed(&self, _owner_id: i64, item: &DownloadItemView) {
        self.record("failed", item);
    }

    fn on_download_finished(&self, _owner_id: i64, item: &DownloadItemView) {
        self.record("finished", item);
    }
}

// ─── Setup ───

/// Settings with a poll period long enough that only explicit `poll_now`
/// calls reconcile, and a download directory under `dir`.
pub fn manual_settings(dir: &std::path::Path) -> DownloadSettings {
    let mut settings = DownloadSettings::default();
    settings.scheduler.poll_interval_ms = 600_000;
    settings.storage.download_dir = Some(dir.join("fallback").to_string_lossy().into_owned());
    settings
}

pub fn manager(
    settings: &DownloadSettings,
    bridge: Arc<MockBridge>,
    probe: Arc<MockProbe>,
    sink: Arc<RecordingSink>,
) -> DownloadManager {
    DownloadManager::new(settings, bridge, probe, sink, Handle::current())
}
