//! Item resolution: turn a channel/playlist/video reference into the ordered
//! item list a job is built from.
//!
//! The engine is reference-type agnostic; references are resolved into one
//! uniform `ItemSpec` representation before a job ever sees them.

mod ytdlp;

pub use ytdlp::YtDlpResolver;

use std::fmt;

use async_trait::async_trait;
use url::Url;

use crate::item::ItemSpec;

/// Closed set of reference variants a user can hand to `create_from`.
/// Each carries the canonical URL the resolver backend will be pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Video(String),
    Playlist(String),
    /// A channel's uploads tab.
    Channel(String),
}

impl Reference {
    pub fn url(&self) -> &str {
        match self {
            Reference::Video(u) | Reference::Playlist(u) | Reference::Channel(u) => u,
        }
    }

    /// Classify a URL (or a bare 11-character video id) into a variant.
    pub fn parse(input: &str) -> Result<Self, ResolutionError> {
        let trimmed = input.trim();
        if is_bare_video_id(trimmed) {
            return Ok(Reference::Video(format!(
                "https://www.youtube.com/watch?v={trimmed}"
            )));
        }

        let url = Url::parse(trimmed)
            .map_err(|_| ResolutionError::UnsupportedReference(trimmed.to_string()))?;
        let host = url
            .host_str()
            .unwrap_or("")
            .trim_start_matches("www.")
            .to_ascii_lowercase();
        let path = url.path();

        if host == "youtu.be" && path.len() > 1 {
            return Ok(Reference::Video(trimmed.to_string()));
        }
        if !matches!(host.as_str(), "youtube.com" | "m.youtube.com" | "music.youtube.com") {
            return Err(ResolutionError::UnsupportedReference(trimmed.to_string()));
        }

        if path == "/watch" && url.query_pairs().any(|(k, _)| k == "v") {
            Ok(Reference::Video(trimmed.to_string()))
        } else if path == "/playlist" && url.query_pairs().any(|(k, _)| k == "list") {
            Ok(Reference::Playlist(trimmed.to_string()))
        } else if path.starts_with("/channel/")
            || path.starts_with("/c/")
            || path.starts_with("/user/")
            || path.starts_with("/@")
        {
            // Point at the uploads tab so flat extraction lists videos.
            let base = trimmed.trim_end_matches('/');
            if base.ends_with("/videos") {
                Ok(Reference::Channel(base.to_string()))
            } else {
                Ok(Reference::Channel(format!("{base}/videos")))
            }
        } else {
            Err(ResolutionError::UnsupportedReference(trimmed.to_string()))
        }
    }

    /// Name hint for a per-collection download directory: the channel handle
    /// or playlist id. Single videos have none and land in the root.
    pub fn dir_hint(&self) -> Option<String> {
        match self {
            Reference::Video(_) => None,
            Reference::Playlist(url) => {
                let parsed = Url::parse(url).ok()?;
                parsed
                    .query_pairs()
                    .find(|(k, _)| k == "list")
                    .map(|(_, v)| v.into_owned())
            }
            Reference::Channel(url) => {
                let parsed = Url::parse(url).ok()?;
                let segments: Vec<&str> = parsed
                    .path_segments()?
                    .filter(|s| !s.is_empty() && *s != "videos")
                    .collect();
                segments
                    .last()
                    .map(|s| s.trim_start_matches('@').to_string())
            }
        }
    }
}

/// Eleven URL-safe base64 characters, the id form users paste from share links.
fn is_bare_video_id(s: &str) -> bool {
    s.len() == 11
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Error produced while resolving a reference. Job creation aborts on any of
/// these; no partial job is left behind.
#[derive(Debug)]
pub enum ResolutionError {
    /// The input is not a URL or id form we understand.
    UnsupportedReference(String),
    /// The resolver backend failed (process error, malformed output).
    Backend(String),
    /// Resolution succeeded but produced no downloadable entries.
    Empty,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::UnsupportedReference(input) => {
                write!(f, "unsupported reference: {}", input)
            }
            ResolutionError::Backend(msg) => write!(f, "{}", msg),
            ResolutionError::Empty => write!(f, "reference resolved to no items"),
        }
    }
}

impl std::error::Error for ResolutionError {}

/// Trait implemented by resolver backends.
#[async_trait]
pub trait ItemResolver: Send + Sync {
    /// Resolve a reference into its ordered item list. Order is significant:
    /// it becomes the job's display and claim order.
    async fn resolve(&self, reference: &Reference) -> Result<Vec<ItemSpec>, ResolutionError>;
}
