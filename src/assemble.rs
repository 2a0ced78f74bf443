use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use chrono::Utc;
use futures_util::{Stream, StreamExt, stream};
use indicatif::ProgressBar;
use reqwest::Client;
use tempfile::TempPath;
use tokio::{fs::File, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, instrument, warn};

use crate::{error::DownloadError, hls::Manifest};

/// Removes the file it points at when dropped
#[derive(Debug)]
pub struct TempFileGuard(Option<TempPath>);

impl TempFileGuard {
    #[must_use]
    pub fn path(&self) -> &Path {
        self.0.as_deref().unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let Some(path) = self.0.take() else {
            return;
        };

        let shown = path.display().to_string();
        match path.close() {
            Ok(()) => debug!("Removed {shown}"),
            Err(e) => warn!("Unable to remove {shown}: {e}"),
        }
    }
}

/// A finished video sitting in a temporary file
///
/// The file lives exactly as long as this value, or the stream made from it.
#[derive(Debug)]
pub struct AssembledOutput {
    guard: TempFileGuard,
    len: u64,
}

impl AssembledOutput {
    /// Creates an empty, uniquely named output file in `dir`
    ///
    /// Names look like `bsky_<unix millis>_<random>.mp4`.
    ///
    /// # Errors
    /// Errors when the directory is not writable
    pub fn create_file(dir: &Path) -> io::Result<(File, TempFileGuard)> {
        let (file, path) = tempfile::Builder::new()
            .prefix(&format!("bsky_{}_", Utc::now().timestamp_millis()))
            .suffix(".mp4")
            .tempfile_in(dir)?
            .into_parts();

        debug!("Created output file {}", path.display());
        Ok((File::from_std(file), TempFileGuard(Some(path))))
    }

    /// Takes ownership of an output file that has been completely written
    ///
    /// # Errors
    /// Errors when the file can't be stat'ed
    pub async fn finish(guard: TempFileGuard) -> io::Result<Self> {
        let len = tokio::fs::metadata(guard.path()).await?.len();
        Ok(Self { guard, len })
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.guard.path().to_path_buf()
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Opens the file for reading; the file is deleted once the stream is dropped
    ///
    /// # Errors
    /// Errors when the file can't be opened
    pub async fn into_stream(self) -> io::Result<AssembledStream> {
        let file = File::open(self.guard.path()).await?;

        Ok(AssembledStream {
            inner: ReaderStream::new(file),
            _guard: self.guard,
        })
    }
}

/// Byte stream over an [`AssembledOutput`] that owns the file's lifetime
#[derive(Debug)]
pub struct AssembledStream {
    inner: ReaderStream<File>,
    _guard: TempFileGuard,
}

impl Stream for AssembledStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[instrument(skip(client))]
async fn get_segment(client: &Client, index: usize, url: &str) -> Result<Bytes, DownloadError> {
    let fetch_error = |source| DownloadError::SegmentFetch {
        index,
        url: url.to_string(),
        source,
    };

    let req = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(fetch_error)?;

    req.bytes().await.map_err(fetch_error)
}

/// Downloads every segment of the manifest and concatenates them into one file
///
/// Up to `parallelism` segments are in flight at once, but they are always
/// written in manifest order. A single failed segment fails the whole thing
/// and the partial file is removed.
///
/// # Errors
/// * [`DownloadError::SegmentFetch`] when a segment can't be downloaded
/// * [`DownloadError::TempFile`] when the output file can't be written
#[instrument(skip(client, manifest, progress), fields(playlist = %manifest.url))]
pub async fn concat_segments(
    client: &Client,
    manifest: &Manifest,
    temp_dir: &Path,
    parallelism: usize,
    progress: &ProgressBar,
) -> Result<AssembledOutput, DownloadError> {
    let total = manifest.segments.len();
    let (mut file, guard) = AssembledOutput::create_file(temp_dir)?;
    progress.set_length(total as u64);

    let mut downloads = stream::iter(manifest.segments.iter().cloned().enumerate())
        .map(|(index, url)| async move { get_segment(client, index, &url).await })
        .buffered(parallelism.max(1));

    let mut index = 0_usize;
    while let Some(segment) = downloads.next().await {
        let segment = segment.inspect_err(|e| {
            error!("Segment {}/{total} failed, discarding output: {e:?}", index + 1);
        })?;

        file.write_all(&segment).await?;
        progress.inc(1);
        index += 1;
        debug!("Wrote segment {index}/{total} ({} bytes)", segment.len());
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let output = AssembledOutput::finish(guard).await?;
    info!("Assembled {total} segments into {} bytes", output.len());

    Ok(output)
}
