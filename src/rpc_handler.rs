//! RPC method handler for the dlbridge JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! The `handle_method` function dispatches JSON-RPC method calls to the
//! download manager and settings engine via the `App` struct.

use std::sync::Mutex;

use serde_json::{json, Value};

use crate::app::App;
use crate::managers::download_manager::DownloadManagerTrait;
use crate::services::settings_engine::SettingsEngineTrait;

fn param_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", key))
}

fn param_owner(params: &Value) -> Result<i64, String> {
    params
        .get("owner_id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| "missing owner_id".to_string())
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub fn handle_method(app: &Mutex<App>, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        // ─── Downloads ───
        "download.start" => {
            let owner_id = param_owner(params)?;
            let url = param_str(params, "url")?;
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("invalid url: must start with http:// or https://".to_string());
            }
            let a = app.lock().map_err(|e| e.to_string())?;
            let guid = a.downloads.start(owner_id, url);
            Ok(json!({"guid": guid}))
        }
        "download.accept_path" => {
            let owner_id = param_owner(params)?;
            let guid = param_str(params, "guid")?;
            let path = params.get("path").and_then(|v| v.as_str()).unwrap_or("");
            let a = app.lock().map_err(|e| e.to_string())?;
            a.downloads
                .accept_path(owner_id, guid, path)
                .map_err(|e| e.to_string())?;
            let item = a.downloads.get(guid);
            Ok(json!({"ok": true, "full_path": item.map(|i| i.full_path)}))
        }
        "download.cancel" => {
            let owner_id = param_owner(params)?;
            let guid = param_str(params, "guid")?;
            let a = app.lock().map_err(|e| e.to_string())?;
            a.downloads.cancel(owner_id, guid).map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "download.cancel_all" => {
            let owner_id = param_owner(params)?;
            let a = app.lock().map_err(|e| e.to_string())?;
            let canceled = a.downloads.cancel_all(owner_id);
            Ok(json!({"canceled": canceled}))
        }
        "download.get" => {
            let guid = param_str(params, "guid")?;
            let a = app.lock().map_err(|e| e.to_string())?;
            serde_json::to_value(a.downloads.get(guid)).map_err(|e| e.to_string())
        }
        "download.list" => {
            let owner_id = param_owner(params)?;
            let a = app.lock().map_err(|e| e.to_string())?;
            let items = a.downloads.list(owner_id);
            Ok(json!({
                "items": items,
                "scheduler": a.downloads.scheduler_state(),
            }))
        }

        // ─── Settings ───
        "settings.get" => {
            let a = app.lock().map_err(|e| e.to_string())?;
            serde_json::to_value(a.settings_engine.get_settings()).map_err(|e| e.to_string())
        }
        "settings.set" => {
            let key = param_str(params, "key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            a.settings_engine
                .set_value(key, value)
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
