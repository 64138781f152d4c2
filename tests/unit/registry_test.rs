//! Unit tests for the DownloadRegistry.
//!
//! Covers insertion, queue-id association, snapshots and the exactly-once
//! terminal claim under contention.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use dlbridge::managers::download_registry::DownloadRegistry;
use dlbridge::managers::poll_scheduler::SchedulerState;
use dlbridge::types::download::{DownloadItem, DownloadState};

fn item(owner: i64, guid: &str) -> DownloadItem {
    DownloadItem::new(owner, guid, "https://example.com/a.zip")
}

// ─── Insertion and lookup ───

#[test]
fn test_put_rejects_duplicate_guid() {
    let registry = DownloadRegistry::new();
    assert!(registry.put(item(1, "g1")));
    assert!(!registry.put(item(2, "g1")));
    assert_eq!(registry.get("g1").unwrap().owner_id, 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_queue_id_resolution() {
    let registry = DownloadRegistry::new();
    registry.put(item(1, "g1"));

    assert!(!registry.map_queue_id(5, "missing"));
    assert!(registry.map_queue_id(5, "g1"));
    assert_eq!(registry.resolve_by_queue_id(5), Some("g1".to_string()));
    assert_eq!(registry.get("g1").unwrap().queue_id, 5);

    registry.remove("g1");
    assert_eq!(registry.resolve_by_queue_id(5), None);
}

#[test]
fn test_snapshot_and_owner_filter() {
    let registry = DownloadRegistry::new();
    registry.put(item(1, "a"));
    registry.put(item(1, "b"));
    registry.put(item(2, "c"));

    assert_eq!(registry.snapshot().len(), 3);
    let mut mine = registry.guids_for_owner(1);
    mine.sort();
    assert_eq!(mine, vec!["a".to_string(), "b".to_string()]);
    assert!(registry.guids_for_owner(3).is_empty());
}

// ─── Mutation ───

#[test]
fn test_update_sees_live_item_only() {
    let registry = DownloadRegistry::new();
    registry.put(item(1, "g1"));

    let moved = registry.update("g1", |it| it.set_state(DownloadState::Probing));
    assert_eq!(moved, Some(true));
    assert_eq!(registry.get("g1").unwrap().state, DownloadState::Probing);

    registry.claim_terminal("g1", |it| it.set_state(DownloadState::Canceled));
    assert!(registry.update("g1", |_| ()).is_none());
    assert!(!registry.contains("g1"));
}

#[test]
fn test_claim_terminal_exactly_once_under_contention() {
    let registry = Arc::new(DownloadRegistry::new());
    registry.put(item(1, "g1"));
    registry.map_queue_id(3, "g1");
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            let winners = winners.clone();
            thread::spawn(move || {
                if registry
                    .claim_terminal("g1", |it| it.set_state(DownloadState::Completed))
                    .is_some()
                {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
    assert_eq!(registry.resolve_by_queue_id(3), None);
}

// ─── Scheduler flag ───

#[test]
fn test_scheduler_flag_follows_registry() {
    let registry = DownloadRegistry::new();
    assert_eq!(registry.scheduler_state(), SchedulerState::Stopped);

    registry.put(item(1, "g1"));
    assert!(registry.try_start_poller());
    assert_eq!(registry.scheduler_state(), SchedulerState::Running);
    assert!(!registry.stop_poller_if_empty());

    registry.remove("g1");
    assert!(registry.stop_poller_if_empty());
    assert!(registry.try_start_poller());
}
