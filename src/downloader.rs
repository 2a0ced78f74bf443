use std::{
    fmt, io,
    path::{Path, PathBuf},
    pin::Pin,
};

use anyhow::{Context, ensure};
use bytes::Bytes;
use futures_util::Stream;
use indicatif::ProgressBar;
use reqwest::Client;
use tokio::{fs::File, io::AsyncWriteExt};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    assemble::{AssembledOutput, concat_segments},
    bsky::{extract_post_reference, get_post_thread, metadata_url},
    config::{RemuxStrategy, Settings},
    direct::open_direct,
    error::DownloadError,
    ffmpeg,
    hls::get_manifest,
    locator::{MediaCandidate, MediaKind, locate_media},
};

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// A video ready to be sent: a byte stream plus its size when known
pub struct Delivery {
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl Delivery {
    /// Streams an assembled file; the file is removed when the body is dropped
    ///
    /// # Errors
    /// Errors when the file can't be reopened for reading
    pub async fn from_assembled(output: AssembledOutput) -> io::Result<Self> {
        let content_length = Some(output.len());
        let body = output.into_stream().await?;

        Ok(Self {
            content_length,
            body: Box::pin(body),
        })
    }

    /// Writes the whole video to `path`
    ///
    /// A file this call created is removed again if the stream fails or `ct`
    /// is cancelled. If `path` can't be created nothing is touched.
    ///
    /// # Errors
    /// Errors when `path` can't be created or written, the stream fails, or
    /// `ct` is cancelled
    pub async fn save(
        self,
        path: &Path,
        progress: &ProgressBar,
        ct: &CancellationToken,
    ) -> anyhow::Result<()> {
        let file = File::create(path)
            .await
            .with_context(|| format!("Creating {}", path.display()))?;

        if let Err(e) = self.write_into(file, progress, ct).await {
            warn!("Removing incomplete {}", path.display());
            tokio::fs::remove_file(path).await.ok();
            return Err(e);
        }

        Ok(())
    }

    async fn write_into(
        self,
        mut file: File,
        progress: &ProgressBar,
        ct: &CancellationToken,
    ) -> anyhow::Result<()> {
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            ensure!(!ct.is_cancelled(), "Cancelled while writing video");

            let chunk = chunk.context("Reading video stream")?;
            file.write_all(&chunk).await.context("Writing video")?;
            progress.inc(chunk.len() as u64);
        }

        file.flush().await.context("Writing video")?;
        Ok(())
    }
}

/// Everything a request needs to turn a post URL into video bytes
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    settings: Settings,
    temp_dir: PathBuf,
}

impl Downloader {
    /// # Errors
    /// Errors when the HTTP client can't be built
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let client = crate::util::init_http_client(
            &settings.user_agent,
            settings.connect_timeout(),
            settings.read_timeout(),
        )?;
        let temp_dir = settings.temp_dir();

        Ok(Self {
            client,
            settings,
            temp_dir,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolves a post URL to the media URL that should be delivered
    ///
    /// # Errors
    /// * [`DownloadError::InvalidPostUrl`] if the URL isn't a post permalink
    /// * [`DownloadError::MetadataFetch`] if the AppView can't be queried
    /// * [`DownloadError::NoMedia`] if the post has no recognizable video
    #[instrument(skip(self))]
    pub async fn resolve(&self, post_url: &str) -> Result<MediaCandidate, DownloadError> {
        let post = extract_post_reference(post_url)
            .ok_or_else(|| DownloadError::InvalidPostUrl(post_url.to_string()))?;

        let url = metadata_url(&self.settings.api_base, &post);
        let metadata = get_post_thread(&self.client, url).await?;

        let candidate = locate_media(&metadata, self.settings.prefer_embed)?;
        info!("Chosen: {candidate}");

        Ok(candidate)
    }

    /// Resolves a post URL and opens its video for streaming
    ///
    /// Playlists are fully assembled before this returns, so a successful
    /// result never carries a partial video. `progress` ticks once per
    /// playlist segment.
    ///
    /// # Errors
    /// Any [`DownloadError`]; nothing is left on disk when this fails
    #[instrument(skip(self, progress))]
    pub async fn deliver(
        &self,
        post_url: &str,
        progress: &ProgressBar,
    ) -> Result<Delivery, DownloadError> {
        let candidate = self.resolve(post_url).await?;

        match candidate.kind {
            MediaKind::Direct => open_direct(&self.client, &candidate.url).await,
            MediaKind::Playlist => {
                let output = self.assemble_playlist(&candidate.url, progress).await?;
                Ok(Delivery::from_assembled(output).await?)
            }
        }
    }

    async fn assemble_playlist(
        &self,
        playlist_url: &str,
        progress: &ProgressBar,
    ) -> Result<AssembledOutput, DownloadError> {
        match self.settings.remux {
            RemuxStrategy::Concat => {
                let manifest = get_manifest(&self.client, playlist_url).await?;
                concat_segments(
                    &self.client,
                    &manifest,
                    &self.temp_dir,
                    usize::from(self.settings.segment_concurrency),
                    progress,
                )
                .await
            }
            RemuxStrategy::Ffmpeg => {
                ffmpeg::remux_playlist(
                    &self.settings.ffmpeg,
                    playlist_url,
                    &self.settings.user_agent,
                    &self.temp_dir,
                )
                .await
            }
        }
    }
}
