use std::{net::SocketAddr, path::Path, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use indicatif::ProgressBar;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

use crate::{
    downloader::{Delivery, Downloader},
    error::DownloadError,
};

/// Every video is offered as `video.mp4`, whatever the source format was
pub const CONTENT_DISPOSITION: &str = r#"attachment; filename="video.mp4""#;

pub type AppState = Arc<Downloader>;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
}

impl IntoResponse for Delivery {
    fn into_response(self) -> Response {
        let mut response = Body::from_stream(self.body).into_response();

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static(CONTENT_DISPOSITION),
        );
        if let Some(len) = self.content_length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }

        response
    }
}

/// `GET /download?url=<post url>`
#[instrument(skip(downloader))]
pub async fn download(
    State(downloader): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Delivery, DownloadError> {
    let post_url = query
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(DownloadError::MissingUrl)?;

    downloader
        .deliver(post_url.trim(), &ProgressBar::hidden())
        .await
        .inspect_err(|e| {
            if e.status().is_server_error() {
                error!("Download of {post_url} failed: {e:?}");
            } else {
                info!("Rejected {post_url}: {e}");
            }
        })
}

/// Builds the router: `/download` plus, if given and present, the static site
/// as fallback
pub fn create_router(downloader: AppState, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new().route("/download", get(download));

    if let Some(dir) = static_dir {
        if dir.is_dir() {
            info!("Serving static files from {}", dir.display());
            app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
        } else {
            warn!(
                "Static directory {} does not exist, not serving a site",
                dir.display()
            );
        }
    }

    app.layer(TraceLayer::new_for_http()).with_state(downloader)
}

/// Serves until `ct` is cancelled
///
/// # Errors
/// Errors when the address can't be bound
pub async fn serve(
    addr: SocketAddr,
    downloader: AppState,
    static_dir: Option<&Path>,
    ct: CancellationToken,
) -> Result<()> {
    let app = create_router(downloader, static_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Launching HTTP server on {addr}"))?;
    info!("Server running on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .context("Running HTTP server")
}
