// dlbridge services
// Services talk to the outside world: the host download queue, metadata probes, event delivery, settings.

pub mod event_bus;
pub mod native_bridge;
pub mod probe_executor;
pub mod settings_engine;

#[cfg(feature = "network")]
pub mod http_bridge;
#[cfg(feature = "network")]
pub mod http_probe;
