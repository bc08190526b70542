//! yt-dlp resolver backend: flat-playlist extraction of channel, playlist,
//! and single-video references into item specs.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::item::ItemSpec;

use super::{ItemResolver, Reference, ResolutionError};

/// Resolver that shells out to `yt-dlp --flat-playlist --dump-single-json`.
pub struct YtDlpResolver {
    binary: String,
    /// Cap on resolved items (the product's "max videos" option).
    max_items: Option<usize>,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            max_items: None,
        }
    }
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, max_items: Option<usize>) -> Self {
        Self {
            binary: binary.into(),
            max_items,
        }
    }
}

/// Flat extraction output: either a playlist-like object with `entries`
/// (channel uploads tab, playlist) or a single video object.
#[derive(Debug, Deserialize)]
struct FlatDump {
    #[serde(default)]
    entries: Option<Vec<FlatEntry>>,
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    filesize_approx: Option<u64>,
}

/// Map the dump into ordered item specs. Entry order is preserved: it is the
/// resolver order jobs display and claim in.
fn items_from_dump(dump: FlatDump, max_items: Option<usize>) -> Result<Vec<ItemSpec>, ResolutionError> {
    let specs: Vec<ItemSpec> = match dump.entries {
        Some(entries) => entries
            .into_iter()
            .filter_map(|entry| {
                let id = entry.id?;
                let source_ref = entry
                    .url
                    .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={id}"));
                let mut spec = ItemSpec::new(id, source_ref);
                spec.title = entry.title;
                spec.size_hint = entry.filesize_approx;
                Some(spec)
            })
            .collect(),
        None => {
            // Single video: the dump itself is the entry.
            let id = dump
                .id
                .ok_or_else(|| ResolutionError::Backend("video dump had no id".to_string()))?;
            let source_ref = dump
                .webpage_url
                .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={id}"));
            let mut spec = ItemSpec::new(id, source_ref);
            spec.title = dump.title;
            vec![spec]
        }
    };

    let capped = match max_items {
        Some(cap) => specs.into_iter().take(cap).collect(),
        None => specs,
    };
    if capped.is_empty() {
        return Err(ResolutionError::Empty);
    }
    Ok(capped)
}

#[async_trait]
impl ItemResolver for YtDlpResolver {
    async fn resolve(&self, reference: &Reference) -> Result<Vec<ItemSpec>, ResolutionError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(reference.url())
            .args(["--flat-playlist", "--dump-single-json", "--quiet", "--no-warnings"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cap) = self.max_items {
            cmd.args(["--playlist-end", &cap.to_string()]);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| ResolutionError::Backend(format!("spawn yt-dlp: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("yt-dlp failed")
                .trim()
                .to_string();
            return Err(ResolutionError::Backend(detail));
        }

        let dump: FlatDump = serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolutionError::Backend(format!("parse yt-dlp output: {e}")))?;
        items_from_dump(dump, self.max_items)
    }
}
