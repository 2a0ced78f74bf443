use std::io;

use futures_util::TryStreamExt;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::{downloader::Delivery, error::DownloadError};

/// Opens a progressive download and hands its body over untouched
///
/// Nothing is buffered beyond what the HTTP client holds. An error halfway
/// through surfaces as a stream error, which aborts the client's transfer.
///
/// # Errors
/// [`DownloadError::DirectFetch`] on network error or non-success status
#[instrument(skip(client))]
pub async fn open_direct(client: &Client, url: &str) -> Result<Delivery, DownloadError> {
    let res = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|source| DownloadError::DirectFetch {
            url: url.to_string(),
            source,
        })?;

    let content_length = res.content_length();
    debug!("Streaming {url} ({content_length:?} bytes)");

    Ok(Delivery {
        content_length,
        body: Box::pin(res.bytes_stream().map_err(io::Error::other)),
    })
}
