use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::Deserialize as _;
use serde_json::Value;
use tracing::debug;

use crate::{bsky::structs::PostThreadResponse, error::DownloadError};

/// Anything that looks like an absolute http(s) URL inside serialized JSON
pub static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"']+"#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Progressive `.mp4` file, streamed as-is
    Direct,
    /// `.m3u8` manifest that needs its segments stitched together
    Playlist,
}

impl MediaKind {
    /// Classifies a URL by its path extension, ignoring any query string or
    /// fragment. Case-insensitive.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let lower = path.to_ascii_lowercase();

        if lower.ends_with(".m3u8") {
            Some(Self::Playlist)
        } else if lower.ends_with(".mp4") {
            Some(Self::Direct)
        } else {
            None
        }
    }
}

/// The one URL picked out of a metadata response as the thing to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaCandidate {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        let kind = MediaKind::from_url(&url)?;
        Some(Self { url, kind })
    }
}

impl fmt::Display for MediaCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Every URL-shaped substring of the text, in the order they appear
pub fn scan_urls(text: &str) -> impl Iterator<Item = &str> {
    URL_REGEX.find_iter(text).map(|m| m.as_str())
}

/// Picks the first URL in the serialized payload that ends in a known media
/// extension.
///
/// There is no ranking. A thumbnail that happens to end in `.mp4` will win
/// over the real video if it is serialized first.
///
/// # Errors
/// [`DownloadError::NoMedia`] when nothing matches
pub fn first_media_candidate(metadata: &Value) -> Result<MediaCandidate, DownloadError> {
    let text = metadata.to_string();

    scan_urls(&text)
        .find_map(MediaCandidate::new)
        .ok_or(DownloadError::NoMedia)
}

/// Reads the video playlist from the typed embed view, if the payload has one
#[must_use]
pub fn embedded_playlist(metadata: &Value) -> Option<MediaCandidate> {
    let thread = PostThreadResponse::deserialize(metadata).ok()?;
    MediaCandidate::new(thread.video_playlist()?)
}

/// Locates the media to deliver.
///
/// With `prefer_embed` the typed `embed.playlist` field is consulted first and
/// the text scan is only a fallback.
///
/// # Errors
/// [`DownloadError::NoMedia`] when nothing matches
pub fn locate_media(metadata: &Value, prefer_embed: bool) -> Result<MediaCandidate, DownloadError> {
    if prefer_embed {
        if let Some(candidate) = embedded_playlist(metadata) {
            debug!("Using embed playlist {candidate}");
            return Ok(candidate);
        }
        debug!("No embed playlist, falling back to scanning");
    }

    first_media_candidate(metadata)
}
