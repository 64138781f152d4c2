//! reqwest-backed metadata probe (HTTP `HEAD`).

use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};

use crate::services::probe_executor::{BoxFuture, MetadataProbe, ProbeOutcome};
use crate::types::errors::ProbeError;
use crate::types::settings::ProbeSettings;

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(settings: &ProbeSettings) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ProbeError::Protocol(format!("failed to build client: {}", e)))?;
        Ok(Self { client })
    }
}

impl MetadataProbe for HttpProbe {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ProbeOutcome, ProbeError>> {
        Box::pin(async move {
            let response = self.client.head(url).send().await.map_err(classify)?;
            let headers = response.headers();
            let total_bytes = headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0);
            let mime_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_lowercase())
                .filter(|v| !v.is_empty());
            let file_name = headers
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(disposition_file_name);
            Ok(ProbeOutcome {
                http_status: response.status().as_u16(),
                total_bytes,
                mime_type,
                file_name,
            })
        })
    }
}

/// Connect and timeout failures are connectivity problems; everything else
/// (bad URL, redirect loops, malformed replies) is a protocol problem.
fn classify(err: reqwest::Error) -> ProbeError {
    if err.is_connect() || err.is_timeout() {
        ProbeError::Connectivity(err.to_string())
    } else {
        ProbeError::Protocol(err.to_string())
    }
}

/// Extracts the file name from a `Content-Disposition` header value.
///
/// `filename*=charset'lang'value` (RFC 6266) wins over `filename=`. Quoted
/// values may contain `;`.
pub fn disposition_file_name(value: &str) -> Option<String> {
    let params = disposition_params(value);
    let extended = params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("filename*"))
        .and_then(|(_, raw)| {
            let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
            percent_decode_str(encoded).decode_utf8().ok().map(|s| s.trim().to_string())
        })
        .filter(|name| !name.is_empty());
    extended.or_else(|| {
        params
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("filename"))
            .map(|(_, raw)| raw.trim().to_string())
            .filter(|name| !name.is_empty())
    })
}

/// Splits `type; key=value; key="quoted; value"` into unquoted key/value pairs.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in value.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .filter_map(|part| {
            let (key, raw) = part.split_once('=')?;
            Some((key.trim().to_string(), raw.trim().to_string()))
        })
        .collect()
}
