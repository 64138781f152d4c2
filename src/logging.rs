use tracing_subscriber::EnvFilter;

use crate::types::settings::LoggingSettings;

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// filter; an unparsable filter falls back to `info`. Output goes to stderr
/// so stdout stays free for RPC frames.
pub fn init_logging(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
