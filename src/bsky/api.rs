use reqwest::Url;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::DownloadError;

/// Fetches a post thread from the AppView as untyped JSON
///
/// The body is kept as a [`Value`] on purpose: media lookup scans it as text
/// and only optionally peeks at the typed embed.
///
/// # Errors
/// [`DownloadError::MetadataFetch`] on network error or when the body isn't JSON
#[instrument(skip(client))]
pub async fn get_post_thread(client: &reqwest::Client, url: Url) -> Result<Value, DownloadError> {
    let fetch_error = |source| DownloadError::MetadataFetch {
        url: url.to_string(),
        source,
    };

    let req = client
        .get(url.clone())
        .send()
        .await
        .map_err(fetch_error)?;

    if !req.status().is_success() {
        warn!("AppView answered with status {}", req.status());
    }

    req.json::<Value>().await.map_err(fetch_error)
}
