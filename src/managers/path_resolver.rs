//! Destination path resolution.
//!
//! Turns a caller-supplied path and a suggested file name into a path that
//! collides neither with an existing file nor with a path another download
//! has already reserved. Reservations live until the owning download
//! terminates and [`PathResolver::release`] is called.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use percent_encoding::percent_decode_str;
use url::Url;

const FALLBACK_FILE_NAME: &str = "download";

/// Process-wide reservation table for download destinations.
#[derive(Debug)]
pub struct PathResolver {
    download_dir: PathBuf,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl PathResolver {
    /// `download_dir` receives files whose requested location is unusable.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        match self.reserved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("path reservation lock poisoned; continuing with recovered state");
                poisoned.into_inner()
            }
        }
    }

    /// True if the parent directory of `path` exists (or can be created) and
    /// is writable.
    pub fn is_writable(path: &Path) -> bool {
        let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return false;
        };
        if !parent.exists() && fs::create_dir_all(parent).is_err() {
            return false;
        }
        match fs::metadata(parent) {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }

    /// Picks the base path before collision handling.
    fn base_path(&self, user_path: &str, suggested_name: &str) -> PathBuf {
        let name = sanitize_file_name(suggested_name);
        let requested = PathBuf::from(user_path);
        if !user_path.is_empty() {
            if requested.is_dir() {
                let candidate = requested.join(&name);
                if Self::is_writable(&candidate) {
                    return candidate;
                }
            } else if Self::is_writable(&requested) {
                return requested;
            }
            tracing::debug!(path = %requested.display(), "requested path not writable, using downloads directory");
        }
        self.download_dir.join(&name)
    }

    /// Reserves a destination for one download and returns it.
    ///
    /// Candidates are `name.ext`, `name(1).ext`, `name(2).ext`, ... The first
    /// one absent from both the filesystem and the reservation table wins and
    /// is recorded before the lock is released, so concurrent callers never
    /// receive the same path.
    pub fn reserve(&self, user_path: &str, suggested_name: &str) -> PathBuf {
        let base = self.base_path(user_path, suggested_name);
        let mut reserved = self.lock();
        let mut index = 0u32;
        loop {
            let candidate = numbered_candidate(&base, index);
            if !reserved.contains(&candidate) && !candidate.exists() {
                reserved.insert(candidate.clone());
                return candidate;
            }
            index += 1;
        }
    }

    /// Drops a reservation. Unknown paths are ignored.
    pub fn release(&self, path: &Path) {
        if path.as_os_str().is_empty() {
            return;
        }
        self.lock().remove(path);
    }

    pub fn is_reserved(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }
}

/// `base` for index 0, otherwise `stem(index).ext` next to it.
pub fn numbered_candidate(base: &Path, index: u32) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    let file_name = match base.extension() {
        Some(ext) => format!("{}({}).{}", stem, index, ext.to_string_lossy()),
        None => format!("{}({})", stem, index),
    };
    base.with_file_name(file_name)
}

/// Strips separators and control characters; empty names become `download`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').to_string();
    if cleaned.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

/// Suggested file name for a download.
///
/// Prefers the `Content-Disposition` filename, then the last URL path
/// segment, then `download`.
pub fn suggest_file_name(url: &str, disposition_name: Option<&str>) -> String {
    if let Some(name) = disposition_name.filter(|n| !n.trim().is_empty()) {
        return sanitize_file_name(name);
    }
    let segment = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        })
        .unwrap_or_default();
    sanitize_file_name(&segment)
}
