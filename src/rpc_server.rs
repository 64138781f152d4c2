//! dlbridge RPC Server: JSON-RPC over stdin/stdout for host integration.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"download.start", "params":{"owner_id":7,"url":"..."}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Event:    {"event":"download.updated", "owner_id":7, "item":{...}}

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dlbridge::app::{load_settings, App};
use dlbridge::logging::init_logging;
use dlbridge::rpc_handler::handle_method;
use dlbridge::services::event_bus::DownloadEventSink;
use dlbridge::services::settings_engine::SettingsEngineTrait;
use dlbridge::types::download::DownloadItemView;

use serde_json::{json, Value};

/// Simple rate limiter: max requests per one-second window.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    fn check(&mut self) -> bool {
        let elapsed = self.window_start.elapsed();
        if elapsed.as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

/// Writes one frame. Responses and events share stdout, so each frame is
/// written under the stdout lock.
fn emit(frame: &Value) {
    let mut out = io::stdout().lock();
    if writeln!(out, "{}", frame).and_then(|_| out.flush()).is_err() {
        tracing::warn!("stdout closed, dropping frame");
    }
}

/// Forwards download events to the host as event frames.
struct JsonLineSink;

impl JsonLineSink {
    fn send(&self, event: &str, owner_id: i64, item: &DownloadItemView) {
        emit(&json!({"event": event, "owner_id": owner_id, "item": item}));
    }
}

impl DownloadEventSink for JsonLineSink {
    fn on_before_download(&self, owner_id: i64, item: &DownloadItemView) {
        self.send("download.before", owner_id, item);
    }

    fn on_download_updated(&self, owner_id: i64, item: &DownloadItemView) {
        self.send("download.updated", owner_id, item);
    }

    fn on_download_failed(&self, owner_id: i64, item: &DownloadItemView) {
        self.send("download.failed", owner_id, item);
    }

    fn on_download_finished(&self, owner_id: i64, item: &DownloadItemView) {
        self.send("download.finished", owner_id, item);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings_engine = load_settings(None);
    init_logging(&settings_engine.get_settings().logging);

    let runtime = tokio::runtime::Runtime::new()?;
    let app = Mutex::new(App::new(
        settings_engine,
        Arc::new(JsonLineSink),
        runtime.handle().clone(),
    )?);

    // Signal ready
    emit(&json!({"event":"ready","version":env!("CARGO_PKG_VERSION")}));

    // Max 200 RPC requests per second
    let mut rate_limiter = RateLimiter::new(200);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() { continue; }

        let req: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                emit(&json!({"id":null,"error":format!("parse error: {}",e)}));
                continue;
            }
        };

        let id = req.get("id").cloned().unwrap_or(Value::Null);

        if !rate_limiter.check() {
            tracing::warn!("rate limit exceeded");
            emit(&json!({"id": id, "error": "rate limit exceeded"}));
            continue;
        }

        let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("");
        let params = req.get("params").cloned().unwrap_or(json!({}));

        let response = match handle_method(&app, method, &params) {
            Ok(val) => json!({"id": id, "result": val}),
            Err(err) => {
                tracing::debug!(method, "request failed: {}", err);
                json!({"id": id, "error": err})
            }
        };
        emit(&response);
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
