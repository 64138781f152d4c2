//! Lifecycle event delivery to the host.
//!
//! Producers (caller thread, probe workers, poll timer, completion listener)
//! publish into one unbounded FIFO channel; a single dispatcher task drains
//! it and hands each event to the sink on the blocking pool. Publishing
//! never blocks, so it is done inside the registry critical section that
//! decided the event, which makes the channel order the causal order for
//! every guid.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::types::download::DownloadItemView;
use crate::types::event::DownloadEvent;

/// Host-side receiver of download notifications.
///
/// Calls are made one at a time on the blocking pool, in publish order, so
/// a sink may write to stdout or a pipe. A slow sink delays later events.
pub trait DownloadEventSink: Send + Sync {
    fn on_before_download(&self, owner_id: i64, item: &DownloadItemView);
    fn on_download_updated(&self, owner_id: i64, item: &DownloadItemView);
    /// Also receives canceled and interrupted downloads.
    fn on_download_failed(&self, owner_id: i64, item: &DownloadItemView);
    fn on_download_finished(&self, owner_id: i64, item: &DownloadItemView);
}

/// Cloneable publishing end of the event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

impl EventBus {
    /// Spawns the dispatcher on `handle` and returns the publisher.
    pub fn start(sink: Arc<dyn DownloadEventSink>, handle: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DownloadEvent>();
        handle.spawn(async move {
            while let Some(event) = rx.recv().await {
                let sink = sink.clone();
                let name = event.name();
                if let Err(e) = tokio::task::spawn_blocking(move || dispatch(sink.as_ref(), &event)).await {
                    tracing::error!(event = name, "event sink panicked: {}", e);
                }
            }
            tracing::debug!("event bus dispatcher stopped");
        });
        Self { tx }
    }

    pub fn publish(&self, event: DownloadEvent) {
        let guid = event.item().guid.clone();
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::warn!(%guid, event = name, "event dispatcher gone, dropping event");
        }
    }
}

fn dispatch(sink: &dyn DownloadEventSink, event: &DownloadEvent) {
    let item = event.item();
    tracing::trace!(guid = %item.guid, event = event.name(), "delivering event");
    match event {
        DownloadEvent::BeforeDownload(item) => sink.on_before_download(item.owner_id, item),
        DownloadEvent::Updated(item) => sink.on_download_updated(item.owner_id, item),
        DownloadEvent::Failed(item) => sink.on_download_failed(item.owner_id, item),
        DownloadEvent::Finished(item) => sink.on_download_finished(item.owner_id, item),
    }
}
