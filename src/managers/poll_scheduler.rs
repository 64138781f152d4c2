//! Periodic reconciliation of tracked downloads against the bridge.
//!
//! The timer is started by the first successful enqueue and exits on the
//! first tick that finds the registry empty. Both transitions are decided
//! under the registry lock (`try_start_poller` / `stop_poller_if_empty`), so
//! an enqueue racing a stopping timer always starts a fresh one.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

use crate::managers::download_manager::DownloadCore;
use crate::services::native_bridge::BridgeState;
use crate::types::download::DownloadState;
use crate::types::errors::ErrorKind;
use crate::types::event::DownloadEvent;

/// Lifecycle of the poll timer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
}

pub struct PollScheduler {
    core: Arc<DownloadCore>,
    interval: Duration,
    handle: Handle,
}

impl PollScheduler {
    pub(crate) fn new(core: Arc<DownloadCore>, interval: Duration, handle: Handle) -> Self {
        Self {
            core,
            interval,
            handle,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the timer unless it is already running.
    pub fn ensure_running(&self) {
        if !self.core.registry.try_start_poller() {
            return;
        }
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "poll scheduler started");
        self.handle
            .spawn(poll_loop(self.core.clone(), self.interval));
    }
}

async fn poll_loop(core: Arc<DownloadCore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; start reconciling one period in.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if core.registry.stop_poller_if_empty() {
            tracing::debug!("registry empty, poll scheduler stopped");
            break;
        }
        let cycle_core = core.clone();
        // Bridge calls may block; keep them off the async workers.
        if let Err(e) = tokio::task::spawn_blocking(move || run_cycle(&cycle_core)).await {
            tracing::error!("poll cycle panicked: {}", e);
        }
    }
}

/// One reconciliation pass over a snapshot of the registry.
pub(crate) fn run_cycle(core: &DownloadCore) {
    let snapshot = core.registry.snapshot();
    tracing::trace!(tracked = snapshot.len(), "poll cycle");

    for view in snapshot {
        if view.queue_id < 0 {
            continue;
        }
        let status = match core.bridge.query_status(view.queue_id) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(guid = %view.guid, queue_id = view.queue_id, "status query failed: {}", e);
                continue;
            }
        };

        match status.state {
            BridgeState::Pending if status.received_bytes == 0 => {
                core.registry.update(&view.guid, |item| {
                    item.apply_progress(0, status.total_bytes);
                });
            }
            BridgeState::Pending | BridgeState::Running => {
                core.registry.update(&view.guid, |item| {
                    item.apply_progress(status.received_bytes, status.total_bytes);
                    item.set_state(DownloadState::Running);
                    core.bus.publish(DownloadEvent::Updated(item.view()));
                });
            }
            BridgeState::Paused if status.raw_error_code != 0 => {
                core.fail_item(&view.guid, ErrorKind::from_raw(status.raw_error_code).code());
            }
            BridgeState::Paused => {
                core.registry.update(&view.guid, |item| {
                    item.apply_progress(status.received_bytes, status.total_bytes);
                    let was = item.state();
                    if item.set_state(DownloadState::Paused) && was != DownloadState::Paused {
                        core.bus.publish(DownloadEvent::Updated(item.view()));
                    }
                });
            }
            BridgeState::Failed => {
                let kind = if status.raw_error_code == 0 {
                    ErrorKind::Unknown
                } else {
                    ErrorKind::from_raw(status.raw_error_code)
                };
                core.fail_item(&view.guid, kind.code());
            }
            BridgeState::Successful => {
                core.finish_item(&view.guid, status);
            }
        }
    }
}
