//! App Core for dlbridge.
//!
//! Central struct holding the settings engine and the download manager.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::managers::download_manager::DownloadManager;
use crate::services::event_bus::DownloadEventSink;
use crate::services::native_bridge::NativeDownloadBridge;
use crate::services::probe_executor::MetadataProbe;
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};

/// Central application struct holding all managers and services.
pub struct App {
    pub settings_engine: SettingsEngine,
    pub downloads: DownloadManager,
}

impl App {
    /// Creates the App with the reqwest-backed probe and download service.
    #[cfg(feature = "network")]
    pub fn new(
        settings_engine: SettingsEngine,
        sink: Arc<dyn DownloadEventSink>,
        handle: Handle,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        use crate::services::http_bridge::HttpDownloadBridge;
        use crate::services::http_probe::HttpProbe;

        let probe_settings = &settings_engine.get_settings().probe;
        let probe = Arc::new(HttpProbe::new(probe_settings)?);
        // Transfers must not inherit the probe timeout.
        let transfer_client = reqwest::Client::builder()
            .user_agent(probe_settings.user_agent.clone())
            .build()?;

        let bridge = Arc::new(HttpDownloadBridge::new(transfer_client, handle.clone()));
        Ok(Self::with_components(settings_engine, bridge, probe, sink, handle))
    }

    /// Creates the App around caller-supplied components.
    pub fn with_components(
        settings_engine: SettingsEngine,
        bridge: Arc<dyn NativeDownloadBridge>,
        probe: Arc<dyn MetadataProbe>,
        sink: Arc<dyn DownloadEventSink>,
        handle: Handle,
    ) -> Self {
        let downloads = DownloadManager::new(
            settings_engine.get_settings(),
            bridge,
            probe,
            sink,
            handle,
        );
        tracing::info!(
            config = settings_engine.get_config_path(),
            download_dir = %downloads.download_dir().display(),
            "dlbridge ready"
        );
        Self {
            settings_engine,
            downloads,
        }
    }
}

/// Builds a settings engine from `config_path`, `$DLBRIDGE_CONFIG` or the
/// platform config directory and loads it, keeping defaults on failure.
pub fn load_settings(config_path: Option<String>) -> SettingsEngine {
    let mut engine = SettingsEngine::new(config_path);
    if let Err(e) = engine.load() {
        tracing::warn!(path = engine.get_config_path(), "using default settings: {}", e);
    }
    engine
}
