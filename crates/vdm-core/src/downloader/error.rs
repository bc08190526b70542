//! Per-item download error type for retry classification.

use std::fmt;

/// Error returned by a single item fetch. Classified by the retry module
/// before the worker decides whether to re-enqueue the item.
#[derive(Debug)]
pub enum DownloadError {
    /// The downloader process could not be started (binary missing,
    /// permission denied). Never retried.
    Spawn(std::io::Error),
    /// The transfer failed mid-stream (network reset, extractor error,
    /// non-zero exit). Carries the backend's own message.
    Transfer(String),
    /// Local storage write failed (disk full, permission denied). Not retried.
    Storage(std::io::Error),
    /// The fetch observed the cancel token and stopped.
    Cancelled,
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::Spawn(e) => write!(f, "spawn: {}", e),
            DownloadError::Transfer(msg) => write!(f, "{}", msg),
            DownloadError::Storage(e) => write!(f, "storage: {}", e),
            DownloadError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownloadError::Spawn(e) | DownloadError::Storage(e) => Some(e),
            DownloadError::Transfer(_) | DownloadError::Cancelled => None,
        }
    }
}
