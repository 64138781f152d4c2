use std::fmt;

// === ErrorKind ===

/// Sentinel code carried by items the user canceled. Not part of the
/// [`ErrorKind`] taxonomy.
pub const USER_CANCELED_CODE: i32 = 40;

/// Canonical failure taxonomy reported to the host in `last_error_code`.
///
/// Raw platform codes (HTTP statuses, download-service errors) are folded
/// onto this closed set by [`ErrorKind::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unclassified failure.
    Unknown,
    /// Generic local file failure.
    FileError,
    /// Not enough space on the destination volume.
    NoSpace,
    /// The file ended before the expected size.
    TooShort,
    /// Destination already exists and matches the source.
    SameAsSource,
    /// Device or transport hiccup; never retried automatically.
    TransientError,
    /// Connectivity-layer failure.
    NetworkFailed,
    /// The network went away mid-request.
    NetworkDisconnected,
    /// Remote server failure.
    ServerFailed,
    /// The server replied with unusable content.
    ServerBadContent,
    /// The server refused access.
    ServerForbidden,
}

impl ErrorKind {
    /// Stable numeric code exposed through `DownloadItemView::last_error_code`.
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::FileError => 1,
            ErrorKind::NoSpace => 3,
            ErrorKind::TransientError => 10,
            ErrorKind::TooShort => 13,
            ErrorKind::SameAsSource => 15,
            ErrorKind::NetworkFailed => 20,
            ErrorKind::NetworkDisconnected => 22,
            ErrorKind::ServerFailed => 30,
            ErrorKind::ServerBadContent => 33,
            ErrorKind::ServerForbidden => 36,
            ErrorKind::Unknown => 99,
        }
    }

    /// Maps a canonical code back to its kind.
    pub fn from_code(code: i32) -> Option<ErrorKind> {
        let kind = match code {
            1 => ErrorKind::FileError,
            3 => ErrorKind::NoSpace,
            10 => ErrorKind::TransientError,
            13 => ErrorKind::TooShort,
            15 => ErrorKind::SameAsSource,
            20 => ErrorKind::NetworkFailed,
            22 => ErrorKind::NetworkDisconnected,
            30 => ErrorKind::ServerFailed,
            33 => ErrorKind::ServerBadContent,
            36 => ErrorKind::ServerForbidden,
            99 => ErrorKind::Unknown,
            _ => return None,
        };
        Some(kind)
    }

    /// Classifies a raw error code reported by the download service.
    ///
    /// Codes 1000-1009 are device/local errors, 4xx and 5xx are HTTP replies.
    pub fn from_raw(raw: i32) -> ErrorKind {
        match raw {
            1001 => ErrorKind::FileError,
            1002 | 1005 => ErrorKind::ServerFailed,
            1004 => ErrorKind::NetworkFailed,
            1006 => ErrorKind::NoSpace,
            1007 => ErrorKind::TransientError,
            1008 => ErrorKind::TooShort,
            1009 => ErrorKind::SameAsSource,
            401 | 403 => ErrorKind::ServerForbidden,
            400..=499 => ErrorKind::ServerBadContent,
            500..=599 => ErrorKind::ServerFailed,
            _ => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unknown => "unknown",
            ErrorKind::FileError => "file error",
            ErrorKind::NoSpace => "no space left",
            ErrorKind::TooShort => "file too short",
            ErrorKind::SameAsSource => "same as source",
            ErrorKind::TransientError => "transient error",
            ErrorKind::NetworkFailed => "network failed",
            ErrorKind::NetworkDisconnected => "network disconnected",
            ErrorKind::ServerFailed => "server failed",
            ErrorKind::ServerBadContent => "server bad content",
            ErrorKind::ServerForbidden => "server forbidden",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

// === DownloadError ===

/// Errors returned by the download manager facade.
#[derive(Debug)]
pub enum DownloadError {
    /// Download with the given guid is not tracked.
    NotFound(String),
    /// The guid belongs to another owner.
    OwnerMismatch(String),
    /// The operation is not valid in the item's current state.
    InvalidState(String),
    /// The download service rejected the request.
    Bridge(BridgeError),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::NotFound(guid) => write!(f, "Download not found: {}", guid),
            DownloadError::OwnerMismatch(guid) => {
                write!(f, "Download owned by another component: {}", guid)
            }
            DownloadError::InvalidState(msg) => write!(f, "Invalid download state: {}", msg),
            DownloadError::Bridge(err) => write!(f, "Download service error: {}", err),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownloadError::Bridge(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BridgeError> for DownloadError {
    fn from(err: BridgeError) -> Self {
        DownloadError::Bridge(err)
    }
}

// === BridgeError ===

/// Errors raised by a native download service.
#[derive(Debug)]
pub enum BridgeError {
    /// The request could not be queued.
    Enqueue(String),
    /// The queue id is unknown to the service.
    NotFound(i64),
    /// A local I/O failure.
    Io(String),
    /// A transport failure talking to the remote server.
    Network(String),
}

impl BridgeError {
    /// Taxonomy kind reported when this error terminates a download.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Enqueue(_) | BridgeError::NotFound(_) => ErrorKind::Unknown,
            BridgeError::Io(_) => ErrorKind::FileError,
            BridgeError::Network(_) => ErrorKind::NetworkFailed,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Enqueue(msg) => write!(f, "Enqueue failed: {}", msg),
            BridgeError::NotFound(id) => write!(f, "Queue entry not found: {}", id),
            BridgeError::Io(msg) => write!(f, "Download I/O error: {}", msg),
            BridgeError::Network(msg) => write!(f, "Download network error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

// === ProbeError ===

/// Errors from submitting or running a metadata probe.
#[derive(Debug)]
pub enum ProbeError {
    /// The probe queue is saturated.
    Rejected,
    /// The probe workers have shut down.
    Closed,
    /// The request was malformed or the server spoke an unexpected protocol.
    Protocol(String),
    /// The server could not be reached.
    Connectivity(String),
}

impl ProbeError {
    /// Taxonomy kind reported when this error fails a download at start.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::Rejected | ProbeError::Closed => ErrorKind::Unknown,
            ProbeError::Protocol(_) => ErrorKind::NetworkFailed,
            ProbeError::Connectivity(_) => ErrorKind::NetworkDisconnected,
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Rejected => write!(f, "Probe queue is full"),
            ProbeError::Closed => write!(f, "Probe executor is shut down"),
            ProbeError::Protocol(msg) => write!(f, "Probe protocol error: {}", msg),
            ProbeError::Connectivity(msg) => write!(f, "Probe connectivity error: {}", msg),
        }
    }
}

impl std::error::Error for ProbeError {}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}
