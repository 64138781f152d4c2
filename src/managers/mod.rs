// dlbridge state managers
// Managers own the download lifecycle: item registry, guid allocation, destination paths, polling.

pub mod download_manager;
pub mod download_registry;
pub mod guid_generator;
pub mod path_resolver;
pub mod poll_scheduler;
