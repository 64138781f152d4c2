use super::download::DownloadItemView;

/// A lifecycle notification queued for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    BeforeDownload(DownloadItemView),
    Updated(DownloadItemView),
    Failed(DownloadItemView),
    Finished(DownloadItemView),
}

impl DownloadEvent {
    pub fn item(&self) -> &DownloadItemView {
        match self {
            DownloadEvent::BeforeDownload(item)
            | DownloadEvent::Updated(item)
            | DownloadEvent::Failed(item)
            | DownloadEvent::Finished(item) => item,
        }
    }

    /// Wire name used by the RPC server.
    pub fn name(&self) -> &'static str {
        match self {
            DownloadEvent::BeforeDownload(_) => "download.before",
            DownloadEvent::Updated(_) => "download.updated",
            DownloadEvent::Failed(_) => "download.failed",
            DownloadEvent::Finished(_) => "download.finished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadEvent::Failed(_) | DownloadEvent::Finished(_))
    }
}
