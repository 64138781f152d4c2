//! dlbridge: one-shot download through the full lifecycle.
//!
//! Starts a download, accepts the destination as soon as the probe
//! announces it, logs progress and exits once the terminal event arrives.
//! When built without the `network` feature there is no download service to
//! drive, so the binary only reports that.

#[cfg(feature = "network")]
mod cli {
    use std::sync::Arc;

    use clap::Parser;
    use tokio::sync::mpsc;

    use dlbridge::app::{load_settings, App};
    use dlbridge::logging::init_logging;
    use dlbridge::managers::download_manager::DownloadManagerTrait;
    use dlbridge::services::event_bus::DownloadEventSink;
    use dlbridge::services::settings_engine::SettingsEngineTrait;
    use dlbridge::types::download::DownloadItemView;
    use dlbridge::types::errors::ErrorKind;
    use dlbridge::types::event::DownloadEvent;

    #[derive(Debug, Parser)]
    #[command(name = "dlbridge")]
    #[command(version)]
    #[command(about = "Download a URL through the dlbridge download lifecycle")]
    struct Cli {
        /// URL to download (http or https)
        url: String,

        /// Destination directory or file; defaults to the configured download directory
        #[arg(short = 'o', long = "output", default_value = "")]
        output: String,

        /// Settings file (overrides $DLBRIDGE_CONFIG)
        #[arg(long)]
        config: Option<String>,

        /// Owner id reported with every event
        #[arg(long = "owner", default_value_t = 1)]
        owner_id: i64,
    }

    /// Hands every event to the main task.
    struct ChannelSink {
        tx: mpsc::UnboundedSender<DownloadEvent>,
    }

    impl ChannelSink {
        fn forward(&self, event: DownloadEvent) {
            let _ = self.tx.send(event);
        }
    }

    impl DownloadEventSink for ChannelSink {
        fn on_before_download(&self, _owner_id: i64, item: &DownloadItemView) {
            self.forward(DownloadEvent::BeforeDownload(item.clone()));
        }

        fn on_download_updated(&self, _owner_id: i64, item: &DownloadItemView) {
            self.forward(DownloadEvent::Updated(item.clone()));
        }

        fn on_download_failed(&self, _owner_id: i64, item: &DownloadItemView) {
            self.forward(DownloadEvent::Failed(item.clone()));
        }

        fn on_download_finished(&self, _owner_id: i64, item: &DownloadItemView) {
            self.forward(DownloadEvent::Finished(item.clone()));
        }
    }

    pub fn run() -> Result<(), Box<dyn std::error::Error>> {
        let cli = Cli::parse();
        let settings_engine = load_settings(cli.config.clone());
        init_logging(&settings_engine.get_settings().logging);

        let runtime = tokio::runtime::Runtime::new()?;
        let (tx, mut events) = mpsc::unbounded_channel();
        let app = App::new(settings_engine, Arc::new(ChannelSink { tx }), runtime.handle().clone())?;

        let guid = app.downloads.start(cli.owner_id, &cli.url);
        runtime.block_on(drive(&app, &cli, &guid, &mut events))
    }

    /// Follows `guid` through its events until the terminal one.
    async fn drive(
        app: &App,
        cli: &Cli,
        guid: &str,
        events: &mut mpsc::UnboundedReceiver<DownloadEvent>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        while let Some(event) = events.recv().await {
            if event.item().guid != guid {
                continue;
            }
            match &event {
                DownloadEvent::BeforeDownload(item) => {
                    tracing::info!(
                        name = %item.suggested_file_name,
                        size = item.total_bytes,
                        mime = %item.mime_type,
                        "probe finished"
                    );
                    app.downloads.accept_path(cli.owner_id, guid, &cli.output)?;
                }
                DownloadEvent::Updated(item) => {
                    tracing::info!(
                        received = item.received_bytes,
                        total = item.total_bytes,
                        percent = item.percent_complete,
                        speed = item.current_speed,
                        state = ?item.state,
                        "progress"
                    );
                }
                DownloadEvent::Finished(item) => {
                    println!("{}", item.full_path);
                    return Ok(());
                }
                DownloadEvent::Failed(item) => {
                    let reason = ErrorKind::from_code(item.last_error_code)
                        .map(|kind| kind.to_string())
                        .unwrap_or_else(|| format!("code {}", item.last_error_code));
                    return Err(format!("download failed: {}", reason).into());
                }
            }
        }
        Err("event stream closed".into())
    }
}

#[cfg(feature = "network")]
fn main() {
    if let Err(e) = cli::run() {
        eprintln!("dlbridge: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "network"))]
fn main() {
    eprintln!(
        "dlbridge v{} was built without the `network` feature; no download service is available.",
        env!("CARGO_PKG_VERSION")
    );
    std::process::exit(2);
}
