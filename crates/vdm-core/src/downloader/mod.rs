//! Downloader seam: the engine drives one item at a time through this trait
//! and observes byte counts through the progress reporter.
//!
//! The engine never touches the network itself; backends are injected so the
//! worker pool, retry policy, and registry can be exercised against fakes.

mod error;
mod ytdlp;

pub use error::DownloadError;
pub use ytdlp::{Quality, YtDlpDownloader, YtDlpOptions};

use async_trait::async_trait;

use crate::control::CancelToken;
use crate::item::ItemSpec;
use crate::progress::ProgressReporter;

/// One-item fetch capability.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Stream one item to storage. Implementations call `progress.report`
    /// zero or more times with monotonically increasing byte counts, and
    /// must check `cancel` at least once per chunk so cancellation latency
    /// stays bounded by one progress interval.
    async fn fetch(
        &self,
        item: &ItemSpec,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<(), DownloadError>;
}
