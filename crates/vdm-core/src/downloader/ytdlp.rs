//! yt-dlp download backend: one child process per item.
//!
//! Progress is read from stdout via `--progress-template` lines; the cancel
//! token is checked per line, which makes each progress chunk a cancellation
//! point, and the child is killed when it fires.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::control::CancelToken;
use crate::item::ItemSpec;
use crate::progress::ProgressReporter;

use super::{DownloadError, Downloader};

/// Prefix emitted by our progress template so progress lines are
/// distinguishable from anything else yt-dlp prints.
const PROGRESS_PREFIX: &str = "vdm-progress ";

/// One line per progress callback: "<downloaded> <total-or-NA>".
const PROGRESS_TEMPLATE: &str = "download:vdm-progress %(progress.downloaded_bytes)s %(progress.total_bytes,progress.total_bytes_estimate)s";

/// Quality option, mirroring the product's "best video" / "audio only" modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Best,
    Audio,
}

impl Quality {
    /// yt-dlp format selector for this quality.
    pub fn selector(self) -> &'static str {
        match self {
            Quality::Best => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            Quality::Audio => "bestaudio/best",
        }
    }
}

#[derive(Debug, Clone)]
pub struct YtDlpOptions {
    /// Binary to spawn; a bare name resolves through PATH.
    pub binary: String,
    /// Directory files land in; created on first fetch.
    pub output_dir: PathBuf,
    pub quality: Quality,
}

impl Default for YtDlpOptions {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            output_dir: PathBuf::from("."),
            quality: Quality::Best,
        }
    }
}

/// Downloader backed by per-item `yt-dlp` invocations.
pub struct YtDlpDownloader {
    options: YtDlpOptions,
}

impl YtDlpDownloader {
    pub fn new(options: YtDlpOptions) -> Self {
        Self { options }
    }

    fn ensure_output_dir(&self) -> Result<(), DownloadError> {
        std::fs::create_dir_all(&self.options.output_dir).map_err(DownloadError::Storage)
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn fetch(
        &self,
        item: &ItemSpec,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<(), DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        self.ensure_output_dir()?;
        let template = self.options.output_dir.join("%(title)s.%(ext)s");

        let mut child = Command::new(&self.options.binary)
            .arg(&item.source_ref)
            .args(["--format", self.options.quality.selector()])
            .arg("--output")
            .arg(&template)
            .args(["--no-playlist", "--newline", "--no-warnings", "--quiet", "--progress"])
            .args(["--progress-template", PROGRESS_TEMPLATE])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DownloadError::Spawn)?;

        let Some(stdout) = child.stdout.take() else {
            return Err(DownloadError::Transfer(
                "yt-dlp stdout was not captured".to_string(),
            ));
        };
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if cancel.is_cancelled() {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(DownloadError::Cancelled);
            }
            if let Some((bytes, total)) = parse_progress_line(&line) {
                progress.report(bytes, total.or(item.size_hint));
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DownloadError::Transfer(e.to_string()))?;
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DownloadError::Transfer(failure_message(
                &stderr,
                output.status.code(),
            )))
        }
    }
}

/// Parse one `--progress-template` line into (downloaded, total?).
/// Returns `None` for anything that is not one of our progress lines.
fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();
    let bytes = parse_count(fields.next()?)?;
    let total = fields.next().and_then(parse_count);
    Some((bytes, total))
}

/// yt-dlp prints byte counts as ints or floats, and "NA" when unknown.
fn parse_count(field: &str) -> Option<u64> {
    if let Ok(n) = field.parse::<u64>() {
        return Some(n);
    }
    field.parse::<f64>().ok().map(|f| f as u64)
}

fn failure_message(stderr: &str, code: Option<i32>) -> String {
    let last_line = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(str::trim);
    match (last_line, code) {
        (Some(line), _) => line.to_string(),
        (None, Some(code)) => format!("yt-dlp exited with status {}", code),
        (None, None) => "yt-dlp terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_with_total() {
        assert_eq!(
            parse_progress_line("vdm-progress 1024 52428800"),
            Some((1024, Some(52428800)))
        );
    }

    #[test]
    fn progress_line_with_unknown_total() {
        assert_eq!(
            parse_progress_line("vdm-progress 4096 NA"),
            Some((4096, None))
        );
    }

    #[test]
    fn progress_line_with_float_counts() {
        assert_eq!(
            parse_progress_line("vdm-progress 1024.0 52428800.0"),
            Some((1024, Some(52428800)))
        );
    }

    #[test]
    fn unrelated_lines_are_skipped() {
        assert_eq!(parse_progress_line("[download] Destination: a.mp4"), None);
        assert_eq!(parse_progress_line(""), None);
        assert_eq!(parse_progress_line("vdm-progress NA NA"), None);
    }

    #[test]
    fn failure_message_prefers_last_stderr_line() {
        let msg = failure_message("WARNING: x\nERROR: HTTP Error 429\n\n", Some(1));
        assert_eq!(msg, "ERROR: HTTP Error 429");
        assert_eq!(
            failure_message("", Some(2)),
            "yt-dlp exited with status 2"
        );
        assert_eq!(failure_message("", None), "yt-dlp terminated by signal");
    }

    #[test]
    fn quality_selectors_match_product_modes() {
        assert!(Quality::Best.selector().contains("bestvideo"));
        assert_eq!(Quality::Audio.selector(), "bestaudio/best");
    }

    #[test]
    fn output_dir_is_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("videos").join("Some Channel");
        let downloader = YtDlpDownloader::new(YtDlpOptions {
            output_dir: nested.clone(),
            ..YtDlpOptions::default()
        });
        downloader.ensure_output_dir().unwrap();
        assert!(nested.is_dir());
    }
}
