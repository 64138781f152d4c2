//! Download registry.
//!
//! Sole owner of every [`DownloadItem`]. One mutex guards the guid map, the
//! queue-id index and the poll scheduler's lifecycle flag, so each public
//! method is a single short critical section. Nothing here performs I/O;
//! callers take views out and talk to the bridge after the lock is gone.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::managers::poll_scheduler::SchedulerState;
use crate::types::download::{DownloadItem, DownloadItemView};

#[derive(Debug)]
struct RegistryInner {
    items: HashMap<String, DownloadItem>,
    queue_index: HashMap<i64, String>,
    scheduler: SchedulerState,
}

impl RegistryInner {
    fn detach(&mut self, guid: &str) -> Option<DownloadItem> {
        let item = self.items.remove(guid)?;
        if let Some(queue_id) = item.queue_id {
            self.queue_index.remove(&queue_id);
        }
        Some(item)
    }
}

/// Thread-safe store of tracked downloads.
#[derive(Debug)]
pub struct DownloadRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for DownloadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                items: HashMap::new(),
                queue_index: HashMap::new(),
                scheduler: SchedulerState::Stopped,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("download registry lock poisoned; continuing with recovered state");
                poisoned.into_inner()
            }
        }
    }

    /// Inserts a new item. Returns false if the guid is already tracked.
    pub fn put(&self, item: DownloadItem) -> bool {
        let mut inner = self.lock();
        if inner.items.contains_key(item.guid()) {
            return false;
        }
        if let Some(queue_id) = item.queue_id {
            inner.queue_index.insert(queue_id, item.guid().to_string());
        }
        inner.items.insert(item.guid().to_string(), item);
        true
    }

    pub fn get(&self, guid: &str) -> Option<DownloadItemView> {
        self.lock().items.get(guid).map(DownloadItem::view)
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.lock().items.contains_key(guid)
    }

    /// Destroys an item, dropping its queue-id association.
    ///
    /// Once the registry is empty the next poll cycle stops the scheduler.
    pub fn remove(&self, guid: &str) -> Option<DownloadItem> {
        self.lock().detach(guid)
    }

    /// Associates a bridge queue id with a tracked guid.
    pub fn map_queue_id(&self, queue_id: i64, guid: &str) -> bool {
        let mut inner = self.lock();
        let Some(item) = inner.items.get_mut(guid) else {
            return false;
        };
        item.queue_id = Some(queue_id);
        inner.queue_index.insert(queue_id, guid.to_string());
        true
    }

    pub fn resolve_by_queue_id(&self, queue_id: i64) -> Option<String> {
        self.lock().queue_index.get(&queue_id).cloned()
    }

    /// Copies every tracked item for iteration outside the lock.
    pub fn snapshot(&self) -> Vec<DownloadItemView> {
        self.lock().items.values().map(DownloadItem::view).collect()
    }

    pub fn guids_for_owner(&self, owner_id: i64) -> Vec<String> {
        self.lock()
            .items
            .values()
            .filter(|item| item.owner_id == owner_id)
            .map(|item| item.guid().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Runs `f` against a live, not yet terminal-dispatched item inside the
    /// critical section. Returns `None` if the item is gone.
    pub fn update<R>(&self, guid: &str, f: impl FnOnce(&mut DownloadItem) -> R) -> Option<R> {
        let mut inner = self.lock();
        let item = inner.items.get_mut(guid)?;
        if item.terminal_dispatched {
            return None;
        }
        Some(f(item))
    }

    /// Claims the right to deliver the item's terminal event.
    ///
    /// Exactly one caller per guid gets `Some`: `f` runs with the item still
    /// in place, the dispatched flag is set and the item is removed from both
    /// maps before the lock is released. Every later claim, from any path,
    /// sees `None`.
    pub fn claim_terminal<R>(
        &self,
        guid: &str,
        f: impl FnOnce(&mut DownloadItem) -> R,
    ) -> Option<(DownloadItem, R)> {
        let mut inner = self.lock();
        let item = inner.items.get_mut(guid)?;
        if item.terminal_dispatched {
            return None;
        }
        let result = f(item);
        item.terminal_dispatched = true;
        let item = inner.detach(guid)?;
        Some((item, result))
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.lock().scheduler
    }

    /// `Stopped -> Running`. Returns true only for the caller that made the
    /// transition and must therefore spawn the timer.
    pub fn try_start_poller(&self) -> bool {
        let mut inner = self.lock();
        if inner.scheduler == SchedulerState::Running {
            return false;
        }
        inner.scheduler = SchedulerState::Running;
        true
    }

    /// `Running -> Stopped` if nothing is tracked. Returns true when the
    /// calling timer must exit.
    pub fn stop_poller_if_empty(&self) -> bool {
        let mut inner = self.lock();
        if !inner.items.is_empty() {
            return false;
        }
        inner.scheduler = SchedulerState::Stopped;
        true
    }
}
