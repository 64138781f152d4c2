//! Integration-level unit tests for the SettingsEngine public API.
//!
//! These tests exercise the SettingsEngine through its public trait interface,
//! validating default loading, value persistence, partial files and reset.

use std::fs;

use dlbridge::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use dlbridge::types::errors::SettingsError;
use dlbridge::types::settings::DownloadSettings;
use tempfile::TempDir;

/// Helper: create a SettingsEngine backed by a temp directory that lives for the
/// duration of the test (the caller holds the `TempDir` handle).
fn engine_in_temp(dir: &TempDir) -> SettingsEngine {
    let path = dir
        .path()
        .join("settings.json")
        .to_string_lossy()
        .to_string();
    SettingsEngine::new(Some(path))
}

/// Without a config file `load()` returns the built-in defaults.
#[test]
fn test_load_defaults_when_no_config_file_exists() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);

    let settings = engine.load().unwrap();

    assert_eq!(settings, DownloadSettings::default());
    assert_eq!(settings.scheduler.poll_interval_ms, 500);
    assert_eq!(settings.probe.workers, 3);
    assert_eq!(settings.probe.queue_capacity, 32);
    assert_eq!(settings.probe.timeout_secs, 15);
    assert_eq!(settings.storage.download_dir, None);
    assert_eq!(settings.logging.filter, "info");
}

/// `set_value` writes through, so a fresh engine on the same file sees it.
#[test]
fn test_set_value_persists_changes() {
    let dir = TempDir::new().unwrap();

    {
        let mut engine = engine_in_temp(&dir);
        engine.load().unwrap();
        engine
            .set_value("scheduler.poll_interval_ms", serde_json::json!(250))
            .unwrap();
        engine
            .set_value("storage.download_dir", serde_json::json!("/data/dl"))
            .unwrap();
    }

    {
        let mut engine2 = engine_in_temp(&dir);
        let loaded = engine2.load().unwrap();
        assert_eq!(loaded.scheduler.poll_interval_ms, 250);
        assert_eq!(loaded.storage.download_dir.as_deref(), Some("/data/dl"));
    }
}

/// Sections missing from the file keep their defaults.
#[test]
fn test_partial_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("settings.json"),
        r#"{"probe":{"workers":8,"queue_capacity":4,"timeout_secs":5,"user_agent":"x"}}"#,
    )
    .unwrap();

    let mut engine = engine_in_temp(&dir);
    let loaded = engine.load().unwrap();
    assert_eq!(loaded.probe.workers, 8);
    assert_eq!(loaded.scheduler.poll_interval_ms, 500);
    assert_eq!(loaded.logging.filter, "info");
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("settings.json"), "{not json").unwrap();

    let mut engine = engine_in_temp(&dir);
    assert!(matches!(engine.load(), Err(SettingsError::SerializationError(_))));
}

#[test]
fn test_set_value_rejects_bad_keys() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);

    assert!(matches!(
        engine.set_value("poll_interval_ms", serde_json::json!(1)),
        Err(SettingsError::InvalidKey(_))
    ));
    assert!(matches!(
        engine.set_value("scheduler.unknown", serde_json::json!(1)),
        Err(SettingsError::InvalidKey(_))
    ));
    assert!(matches!(
        engine.set_value("scheduler.poll_interval_ms", serde_json::json!(-5)),
        Err(SettingsError::InvalidValue(_))
    ));
}

/// `reset()` reverts in memory and on disk.
#[test]
fn test_reset_restores_defaults() {
    let dir = TempDir::new().unwrap();

    {
        let mut engine = engine_in_temp(&dir);
        engine.load().unwrap();
        engine
            .set_value("logging.filter", serde_json::json!("dlbridge=debug"))
            .unwrap();
        assert_eq!(engine.get_settings().logging.filter, "dlbridge=debug");

        engine.reset().unwrap();
        assert_eq!(*engine.get_settings(), DownloadSettings::default());
    }

    {
        let mut engine2 = engine_in_temp(&dir);
        assert_eq!(engine2.load().unwrap(), DownloadSettings::default());
    }
}
