use serde::{Deserialize, Serialize};

/// Lifecycle state of a download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadState {
    Pending,
    Probing,
    AwaitingPath,
    Queued,
    Running,
    Paused,
    Completed,
    Canceled,
    Interrupted,
}

impl DownloadState {
    /// Returns true for the absorbing states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Canceled | DownloadState::Interrupted
        )
    }

    fn rank(&self) -> u8 {
        match self {
            DownloadState::Pending => 0,
            DownloadState::Probing => 1,
            DownloadState::AwaitingPath => 2,
            DownloadState::Queued => 3,
            DownloadState::Running | DownloadState::Paused => 4,
            DownloadState::Completed | DownloadState::Canceled | DownloadState::Interrupted => 5,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    ///
    /// States only move forward, except for the `Running`/`Paused` pair.
    /// Any non-terminal state may jump straight to a terminal one.
    pub fn can_transition_to(&self, next: DownloadState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next.is_terminal() {
            return true;
        }
        if *self == next {
            return true;
        }
        next.rank() > self.rank()
            || matches!(
                (self, next),
                (DownloadState::Running, DownloadState::Paused)
                    | (DownloadState::Paused, DownloadState::Running)
            )
    }
}

/// One in-flight or recently terminal download, owned by the registry.
#[derive(Debug, Clone)]
pub struct DownloadItem {
    pub owner_id: i64,
    guid: String,
    pub queue_id: Option<i64>,
    pub url: String,
    pub method: String,
    pub mime_type: String,
    state: DownloadState,
    pub total_bytes: u64,
    pub received_bytes: u64,
    pub last_bytes: u64,
    pub current_speed: u64,
    pub percent_complete: u8,
    pub last_error_code: i32,
    pub suggested_file_name: String,
    full_path: String,
    pub real_path: String,
    pub real_name: String,
    pub(crate) terminal_dispatched: bool,
}

impl DownloadItem {
    pub fn new(owner_id: i64, guid: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            owner_id,
            guid: guid.into(),
            queue_id: None,
            url: url.into(),
            method: "GET".to_string(),
            mime_type: String::new(),
            state: DownloadState::Pending,
            total_bytes: 0,
            received_bytes: 0,
            last_bytes: 0,
            current_speed: 0,
            percent_complete: 0,
            last_error_code: 0,
            suggested_file_name: String::new(),
            full_path: String::new(),
            real_path: String::new(),
            real_name: String::new(),
            terminal_dispatched: false,
        }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Moves to `next` if the lifecycle allows it. Returns whether it moved.
    pub fn set_state(&mut self, next: DownloadState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Fixes the destination path. Later calls leave the first value in place.
    pub fn set_full_path(&mut self, path: impl Into<String>) -> bool {
        if !self.full_path.is_empty() {
            return false;
        }
        self.full_path = path.into();
        true
    }

    /// Applies a status sample from the download service.
    ///
    /// A zero `total` keeps the previously known size. Received bytes are
    /// clamped to the total when one is known.
    pub fn apply_progress(&mut self, received: u64, total: u64) {
        if total > 0 {
            self.total_bytes = total;
        }
        let received = if self.total_bytes > 0 {
            received.min(self.total_bytes)
        } else {
            received
        };
        self.received_bytes = received;
        self.current_speed = capped_speed(self.last_bytes, received, self.total_bytes);
        self.percent_complete = percent_complete(received, self.total_bytes);
        self.last_bytes = received;
    }

    /// Clears progress and the destination on user cancellation.
    pub(crate) fn reset_for_cancel(&mut self) {
        self.received_bytes = 0;
        self.percent_complete = 0;
        self.current_speed = 0;
        self.full_path.clear();
    }

    pub fn view(&self) -> DownloadItemView {
        DownloadItemView {
            owner_id: self.owner_id,
            guid: self.guid.clone(),
            queue_id: self.queue_id.unwrap_or(-1),
            url: self.url.clone(),
            method: self.method.clone(),
            mime_type: self.mime_type.clone(),
            state: self.state,
            total_bytes: self.total_bytes,
            received_bytes: self.received_bytes,
            last_bytes: self.last_bytes,
            current_speed: self.current_speed,
            percent_complete: self.percent_complete,
            last_error_code: self.last_error_code,
            suggested_file_name: self.suggested_file_name.clone(),
            full_path: self.full_path.clone(),
            real_path: self.real_path.clone(),
            real_name: self.real_name.clone(),
        }
    }
}

/// Immutable snapshot of a [`DownloadItem`] handed to the host.
///
/// `queue_id` is `-1` until the download service has accepted the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItemView {
    pub owner_id: i64,
    pub guid: String,
    pub queue_id: i64,
    pub url: String,
    pub method: String,
    pub mime_type: String,
    pub state: DownloadState,
    pub total_bytes: u64,
    pub received_bytes: u64,
    pub last_bytes: u64,
    pub current_speed: u64,
    pub percent_complete: u8,
    pub last_error_code: i32,
    pub suggested_file_name: String,
    pub full_path: String,
    pub real_path: String,
    pub real_name: String,
}

/// Bytes received since the previous poll, capped at twice the bytes that
/// were still outstanding at that poll when the total is known.
pub fn capped_speed(last_bytes: u64, received: u64, total: u64) -> u64 {
    let delta = received.saturating_sub(last_bytes);
    if total == 0 {
        return delta;
    }
    let cap = total.saturating_sub(last_bytes).saturating_mul(2);
    delta.min(cap)
}

/// `round(100 * received / total)`, or 0 when the total is unknown.
pub fn percent_complete(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let received = received.min(total) as u128;
    let total = total as u128;
    ((received * 100 + total / 2) / total) as u8
}
