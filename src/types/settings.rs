use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level settings container for the download subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DownloadSettings {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Poll loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    pub poll_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

impl SchedulerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Metadata probe pool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 32,
            timeout_secs: 15,
            user_agent: format!("dlbridge/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where files land when the caller's path is unusable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageSettings {
    pub download_dir: Option<String>,
}

/// Log filter directive for `tracing-subscriber`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
