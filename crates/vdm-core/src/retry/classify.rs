//! Map download errors onto retry classifications.

use crate::downloader::DownloadError;

use super::policy::ErrorKind;

/// Substrings in backend transfer messages that indicate throttling rather
/// than a plain transfer failure.
const THROTTLE_MARKERS: &[&str] = &["429", "rate-limit", "rate limit", "too many requests"];

/// Classify a per-item download error for the retry policy.
pub fn classify(err: &DownloadError) -> ErrorKind {
    match err {
        DownloadError::Cancelled => ErrorKind::Cancelled,
        DownloadError::Spawn(_) | DownloadError::Storage(_) => ErrorKind::Permanent,
        DownloadError::Transfer(msg) => {
            let lower = msg.to_ascii_lowercase();
            if THROTTLE_MARKERS.iter().any(|m| lower.contains(m)) {
                ErrorKind::Throttled
            } else {
                ErrorKind::Transfer
            }
        }
    }
}
