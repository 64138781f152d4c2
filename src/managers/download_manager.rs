//! Download Manager for dlbridge.
//!
//! Facade over the registry, path resolver, probe pool, poll scheduler and
//! event bus. Every state change happens inside one registry critical
//! section together with the event it produces; bridge calls, filesystem
//! work and probe I/O happen outside it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::managers::download_registry::DownloadRegistry;
use crate::managers::guid_generator::GuidGenerator;
use crate::managers::path_resolver::{suggest_file_name, PathResolver};
use crate::managers::poll_scheduler::{PollScheduler, SchedulerState};
use crate::platform;
use crate::services::event_bus::{DownloadEventSink, EventBus};
use crate::services::native_bridge::{
    completion_channel, BridgeState, BridgeStatus, CompletionSignal, NativeDownloadBridge,
};
use crate::services::probe_executor::{MetadataProbe, ProbeExecutor, ProbeOutcome, ProbeTask};
use crate::types::download::{percent_complete, DownloadItem, DownloadItemView, DownloadState};
use crate::types::errors::{DownloadError, ErrorKind, ProbeError, USER_CANCELED_CODE};
use crate::types::event::DownloadEvent;
use crate::types::settings::DownloadSettings;

/// Trait defining the operations the browser component calls.
pub trait DownloadManagerTrait {
    fn start(&self, owner_id: i64, url: &str) -> String;
    fn accept_path(&self, owner_id: i64, guid: &str, path: &str) -> Result<(), DownloadError>;
    fn cancel(&self, owner_id: i64, guid: &str) -> Result<(), DownloadError>;
    fn cancel_all(&self, owner_id: i64) -> usize;
    fn get(&self, guid: &str) -> Option<DownloadItemView>;
    fn list(&self, owner_id: i64) -> Vec<DownloadItemView>;
}

/// State shared by the facade, probe workers, poll timer and completion
/// listener.
pub(crate) struct DownloadCore {
    pub(crate) registry: DownloadRegistry,
    pub(crate) resolver: PathResolver,
    pub(crate) bridge: Arc<dyn NativeDownloadBridge>,
    pub(crate) bus: EventBus,
}

impl DownloadCore {
    /// Bridge removal and reservation release after an item was destroyed.
    fn cleanup(&self, item: &DownloadItem, reserved_path: &str) {
        if let Some(queue_id) = item.queue_id {
            if let Err(e) = self.bridge.remove(queue_id) {
                tracing::debug!(guid = item.guid(), queue_id, "bridge remove ignored: {}", e);
            }
        }
        self.resolver.release(Path::new(reserved_path));
    }

    /// Terminates an item as `Interrupted` with `code`. Returns false if some
    /// other path already delivered its terminal event.
    pub(crate) fn fail_item(&self, guid: &str, code: i32) -> bool {
        let claimed = self.registry.claim_terminal(guid, |item| {
            item.set_state(DownloadState::Interrupted);
            item.last_error_code = code;
            item.current_speed = 0;
            self.bus.publish(DownloadEvent::Failed(item.view()));
        });
        let Some((item, ())) = claimed else {
            return false;
        };
        tracing::warn!(guid, code, url = %item.url, "download interrupted");
        self.cleanup(&item, item.full_path());
        true
    }

    /// Terminates an item as `Completed` using the final bridge sample.
    pub(crate) fn finish_item(&self, guid: &str, status: BridgeStatus) -> bool {
        let claimed = self.registry.claim_terminal(guid, |item| {
            item.apply_progress(status.received_bytes, status.total_bytes);
            if item.total_bytes == 0 {
                item.total_bytes = item.received_bytes;
            }
            item.percent_complete = if item.total_bytes == 0 {
                100
            } else {
                percent_complete(item.received_bytes, item.total_bytes)
            };
            item.last_error_code = 0;
            item.set_state(DownloadState::Completed);
            self.bus.publish(DownloadEvent::Finished(item.view()));
        });
        let Some((item, ())) = claimed else {
            return false;
        };
        tracing::info!(guid, bytes = item.received_bytes, path = item.full_path(), "download finished");
        self.cleanup(&item, item.full_path());
        true
    }

    /// Handles a probe result on a probe worker.
    pub(crate) fn on_probe_finished(&self, task: ProbeTask, result: Result<ProbeOutcome, ProbeError>) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(guid = %task.guid, url = %task.url, "probe failed: {}", err);
                self.fail_item(&task.guid, err.kind().code());
                return;
            }
        };

        let announced = self.registry.update(&task.guid, |item| {
            if item.state() != DownloadState::Probing {
                return false;
            }
            if outcome.is_ok() {
                item.total_bytes = outcome.total_bytes;
                if let Some(mime) = &outcome.mime_type {
                    item.mime_type = mime.clone();
                }
                item.suggested_file_name = suggest_file_name(&item.url, outcome.file_name.as_deref());
            }
            item.set_state(DownloadState::AwaitingPath);
            self.bus.publish(DownloadEvent::BeforeDownload(item.view()));
            true
        });

        match announced {
            Some(true) => tracing::info!(
                guid = %task.guid,
                status = outcome.http_status,
                total = outcome.total_bytes,
                "probe finished, awaiting path"
            ),
            _ => tracing::debug!(guid = %task.guid, "probe result for a download no longer probing"),
        }
    }

    /// Handles a completion signal for `queue_id`, from any thread.
    pub(crate) fn on_completion(&self, queue_id: i64) {
        let Some(guid) = self.registry.resolve_by_queue_id(queue_id) else {
            tracing::debug!(queue_id, "completion for an untracked queue entry");
            return;
        };
        match self.bridge.query_status(queue_id) {
            Ok(status) if status.state == BridgeState::Successful => {
                self.finish_item(&guid, status);
            }
            Ok(status) => {
                let kind = if status.raw_error_code == 0 {
                    ErrorKind::Unknown
                } else {
                    ErrorKind::from_raw(status.raw_error_code)
                };
                self.fail_item(&guid, kind.code());
            }
            Err(e) => {
                tracing::warn!(%guid, queue_id, "final status query failed: {}", e);
                self.fail_item(&guid, e.kind().code());
            }
        }
    }
}

/// Download manager shared by all browser components of one process.
pub struct DownloadManager {
    core: Arc<DownloadCore>,
    probes: ProbeExecutor,
    scheduler: PollScheduler,
    guids: GuidGenerator,
    signal: CompletionSignal,
}

impl DownloadManager {
    /// Wires the components together and spawns the background tasks
    /// (event dispatcher, probe workers, completion listener) on `handle`.
    pub fn new(
        settings: &DownloadSettings,
        bridge: Arc<dyn NativeDownloadBridge>,
        probe: Arc<dyn MetadataProbe>,
        sink: Arc<dyn DownloadEventSink>,
        handle: Handle,
    ) -> Self {
        let download_dir = settings
            .storage
            .download_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(platform::get_download_dir);

        let core = Arc::new(DownloadCore {
            registry: DownloadRegistry::new(),
            resolver: PathResolver::new(download_dir),
            bridge: bridge.clone(),
            bus: EventBus::start(sink, &handle),
        });

        let probe_core = core.clone();
        let probes = ProbeExecutor::start(
            settings.probe.workers,
            settings.probe.queue_capacity,
            probe,
            Arc::new(move |task, result| probe_core.on_probe_finished(task, result)),
            &handle,
        );

        let (signal, mut completions) = completion_channel();
        let listener_core = core.clone();
        handle.spawn(async move {
            while let Some(queue_id) = completions.recv().await {
                let core = listener_core.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || core.on_completion(queue_id)).await {
                    tracing::error!(queue_id, "completion handler panicked: {}", e);
                }
            }
        });
        bridge.attach_completion_signal(signal.clone());

        let scheduler = PollScheduler::new(core.clone(), settings.scheduler.poll_interval(), handle);

        Self {
            core,
            probes,
            scheduler,
            guids: GuidGenerator::new(),
            signal,
        }
    }

    /// External completion notification (host broadcast). Safe from any
    /// thread; runs the final status query on the calling thread.
    pub fn on_download_complete(&self, queue_id: i64) {
        self.core.on_completion(queue_id);
    }

    /// Channel form of [`Self::on_download_complete`] for services that push
    /// notifications from their own threads.
    pub fn completion_signal(&self) -> CompletionSignal {
        self.signal.clone()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.core.registry.scheduler_state()
    }

    pub fn tracked_count(&self) -> usize {
        self.core.registry.len()
    }

    pub fn download_dir(&self) -> &Path {
        self.core.resolver.download_dir()
    }

    pub fn is_path_reserved(&self, path: &Path) -> bool {
        self.core.resolver.is_reserved(path)
    }

    /// Runs one reconciliation pass on the calling thread.
    pub fn poll_now(&self) {
        crate::managers::poll_scheduler::run_cycle(&self.core);
    }
}

impl DownloadManagerTrait for DownloadManager {
    /// Creates the item, moves it to `Probing` and queues its probe. A full
    /// probe queue fails the item immediately with a start-failed event; the
    /// guid is returned either way.
    fn start(&self, owner_id: i64, url: &str) -> String {
        let guid = self.guids.next_guid();
        let mut item = DownloadItem::new(owner_id, guid.clone(), url);
        item.suggested_file_name = suggest_file_name(url, None);
        item.set_state(DownloadState::Probing);
        self.core.registry.put(item);
        tracing::info!(%guid, owner_id, url, "download started");

        let task = ProbeTask {
            guid: guid.clone(),
            url: url.to_string(),
        };
        if let Err(err) = self.probes.submit(task) {
            tracing::warn!(%guid, "probe submission failed: {}", err);
            self.core.fail_item(&guid, err.kind().code());
        }
        guid
    }

    /// Resolves the destination, queues the transfer and starts polling.
    ///
    /// A second call once the destination is fixed is a no-op.
    fn accept_path(&self, owner_id: i64, guid: &str, path: &str) -> Result<(), DownloadError> {
        let request = self
            .core
            .registry
            .update(guid, |item| {
                if item.owner_id != owner_id {
                    return Err(DownloadError::OwnerMismatch(guid.to_string()));
                }
                if !item.full_path().is_empty() {
                    return Ok(None);
                }
                if item.state() != DownloadState::AwaitingPath {
                    return Err(DownloadError::InvalidState(format!(
                        "{} is {:?}, expected AwaitingPath",
                        guid,
                        item.state()
                    )));
                }
                Ok(Some((item.url.clone(), item.suggested_file_name.clone())))
            })
            .ok_or_else(|| DownloadError::NotFound(guid.to_string()))??;
        let Some((url, suggested)) = request else {
            tracing::debug!(guid, "destination already fixed");
            return Ok(());
        };

        let dest = self.core.resolver.reserve(path, &suggested);
        let dest_str = dest.to_string_lossy().into_owned();
        let real_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let fixed = self.core.registry.update(guid, |item| {
            if item.state() != DownloadState::AwaitingPath || !item.set_full_path(dest_str.clone()) {
                return false;
            }
            item.real_path = dest_str.clone();
            item.real_name = real_name.clone();
            true
        });
        match fixed {
            Some(true) => {}
            Some(false) => {
                self.core.resolver.release(&dest);
                return Ok(());
            }
            None => {
                self.core.resolver.release(&dest);
                return Err(DownloadError::NotFound(guid.to_string()));
            }
        }

        let queue_id = match self.core.bridge.enqueue(&url, &dest_str) {
            Ok(queue_id) => queue_id,
            Err(err) => {
                tracing::warn!(guid, url = %url, "enqueue failed: {}", err);
                self.core.fail_item(guid, err.kind().code());
                return Err(DownloadError::Bridge(err));
            }
        };

        if !self.core.registry.map_queue_id(queue_id, guid) {
            // Canceled while the bridge call was in flight.
            if let Err(e) = self.core.bridge.remove(queue_id) {
                tracing::debug!(guid, queue_id, "bridge remove ignored: {}", e);
            }
            self.core.resolver.release(&dest);
            return Err(DownloadError::NotFound(guid.to_string()));
        }
        self.core.registry.update(guid, |item| item.set_state(DownloadState::Queued));
        tracing::info!(guid, queue_id, dest = %dest_str, "download queued");

        self.scheduler.ensure_running();
        Ok(())
    }

    /// Cancels from any non-terminal state; progress and destination are
    /// cleared in the reported snapshot.
    fn cancel(&self, owner_id: i64, guid: &str) -> Result<(), DownloadError> {
        let view = self
            .core
            .registry
            .get(guid)
            .ok_or_else(|| DownloadError::NotFound(guid.to_string()))?;
        if view.owner_id != owner_id {
            return Err(DownloadError::OwnerMismatch(guid.to_string()));
        }

        let claimed = self.core.registry.claim_terminal(guid, |item| {
            let reserved = item.full_path().to_string();
            item.set_state(DownloadState::Canceled);
            item.reset_for_cancel();
            item.last_error_code = USER_CANCELED_CODE;
            self.core.bus.publish(DownloadEvent::Failed(item.view()));
            reserved
        });
        let (item, reserved) = claimed.ok_or_else(|| DownloadError::NotFound(guid.to_string()))?;
        tracing::info!(guid, owner_id, "download canceled");
        self.core.cleanup(&item, &reserved);
        Ok(())
    }

    /// Cancels every download of `owner_id`, e.g. when its browser component
    /// goes away. Returns how many were canceled.
    fn cancel_all(&self, owner_id: i64) -> usize {
        self.core
            .registry
            .guids_for_owner(owner_id)
            .iter()
            .filter(|guid| self.cancel(owner_id, guid).is_ok())
            .count()
    }

    fn get(&self, guid: &str) -> Option<DownloadItemView> {
        self.core.registry.get(guid)
    }

    fn list(&self, owner_id: i64) -> Vec<DownloadItemView> {
        let mut items: Vec<DownloadItemView> = self
            .core
            .registry
            .snapshot()
            .into_iter()
            .filter(|item| item.owner_id == owner_id)
            .collect();
        items.sort_by(|a, b| a.guid.cmp(&b.guid));
        items
    }
}
