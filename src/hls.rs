use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::error::DownloadError;

/// How many master → variant hops are followed before giving up
const MAX_VARIANT_DEPTH: usize = 3;

/// A media playlist reduced to its segment URLs, in playback order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// URL of the media playlist the segments came from
    pub url: String,
    pub segments: Vec<String>,
}

/// Everything up to and including the last `/` of the URL's path
///
/// A query string is not considered part of the path, so a `/` inside it
/// doesn't move the base.
#[must_use]
pub fn base_path(url: &str) -> &str {
    let path_end = url.find(['?', '#']).unwrap_or(url.len());
    let cut = url[..path_end].rfind('/').map_or(0, |i| i + 1);
    &url[..cut]
}

/// Absolute references pass through, everything else is glued onto `base`
#[must_use]
pub fn resolve_reference(reference: &str, base: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        reference.to_string()
    } else {
        format!("{base}{reference}")
    }
}

/// Every non-blank, non-comment line of the playlist resolved against `base`
#[must_use]
pub fn parse_segments(playlist: &str, base: &str) -> Vec<String> {
    playlist
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| resolve_reference(line, base))
        .collect()
}

#[must_use]
pub fn is_master_playlist(playlist: &str) -> bool {
    playlist
        .lines()
        .any(|line| line.trim_start().starts_with("#EXT-X-STREAM-INF"))
}

/// URI of the first non-I-frame variant in a master playlist
///
/// Falls back to the first plain URI line if `m3u8-rs` can't make sense of
/// the document.
#[must_use]
pub fn first_variant(playlist: &str, base: &str) -> Option<String> {
    match m3u8_rs::parse_master_playlist_res(playlist.as_bytes()) {
        Ok(master) => {
            // TODO: Pick the highest bandwidth variant instead of the first listed one
            let variant = master.variants.iter().find(|v| !v.is_i_frame)?;
            Some(resolve_reference(&variant.uri, base))
        }
        Err(e) => {
            warn!("Unable to parse master playlist, using first URI line: {e}");
            parse_segments(playlist, base).into_iter().next()
        }
    }
}

/// Fetches a playlist as text
///
/// # Errors
/// [`DownloadError::PlaylistFetch`] on network error or non-success status
#[instrument(skip(client))]
pub async fn get_playlist(client: &Client, url: &str) -> Result<String, DownloadError> {
    let fetch_error = |source| DownloadError::PlaylistFetch {
        url: url.to_string(),
        source,
    };

    let req = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(fetch_error)?;

    req.text().await.map_err(fetch_error)
}

/// Fetches a playlist and turns it into an ordered list of segment URLs
///
/// Master playlists are followed to their first variant.
///
/// # Errors
/// * [`DownloadError::PlaylistFetch`] if any playlist can't be fetched
/// * [`DownloadError::NoSegments`] if the media playlist lists nothing
#[instrument(skip(client))]
pub async fn get_manifest(client: &Client, url: &str) -> Result<Manifest, DownloadError> {
    let mut url = url.to_string();

    for _ in 0..=MAX_VARIANT_DEPTH {
        let playlist = get_playlist(client, &url).await?;
        let base = base_path(&url);

        if is_master_playlist(&playlist) {
            let Some(variant) = first_variant(&playlist, base) else {
                return Err(DownloadError::NoSegments { playlist: url });
            };
            debug!("Master playlist, following variant {variant}");
            url = variant;
            continue;
        }

        let segments = parse_segments(&playlist, base);
        if segments.is_empty() {
            return Err(DownloadError::NoSegments { playlist: url });
        }

        info!("Found {} segments", segments.len());
        return Ok(Manifest { url, segments });
    }

    warn!("Gave up after {MAX_VARIANT_DEPTH} nested master playlists");
    Err(DownloadError::NoSegments { playlist: url })
}
