use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Everything that can go wrong between receiving a post URL and handing a
/// byte stream back to the caller.
///
/// The `Display` text is what the client sees, so it stays short and never
/// includes internal paths. The fields exist for logging.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Missing url")]
    MissingUrl,

    #[error("Invalid Bluesky URL")]
    InvalidPostUrl(String),

    #[error("No video found")]
    NoMedia,

    #[error("No segments found in playlist")]
    NoSegments { playlist: String },

    #[error("Failed to fetch API")]
    MetadataFetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Direct download failed")]
    DirectFetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to fetch playlist")]
    PlaylistFetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Segment download failed")]
    SegmentFetch {
        index: usize,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Remux failed")]
    Remux(String),

    #[error("Failed to prepare output file")]
    TempFile(#[from] std::io::Error),
}

impl DownloadError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl | Self::InvalidPostUrl(_) => StatusCode::BAD_REQUEST,
            Self::NoMedia | Self::NoSegments { .. } => StatusCode::NOT_FOUND,
            Self::MetadataFetch { .. }
            | Self::DirectFetch { .. }
            | Self::PlaylistFetch { .. }
            | Self::SegmentFetch { .. }
            | Self::Remux(_)
            | Self::TempFile(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
