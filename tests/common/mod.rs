//! Fake upstream shared by the integration tests
//!
//! One in-process axum server stands in for the AppView, the video CDN and
//! the segment hosts. Routes are registered after binding so payloads can
//! point back at the server's own address.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    io,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use bsky_squirrel::{Downloader, config::Settings};
use bytes::Bytes;
use futures_util::stream;
use reqwest::Url;
use serde_json::Value;

pub const THREAD_PATH: &str = "/xrpc/app.bsky.feed.getPostThread";
pub const POST_URL: &str = "https://bsky.app/profile/alice.bsky.social/post/abc123";

#[derive(Clone)]
struct Route {
    status: StatusCode,
    body: Vec<u8>,
    delay: Option<Duration>,
    /// Hang up after this many bytes, while still announcing the full length
    cut_after: Option<usize>,
}

#[derive(Clone, Default)]
struct Shared {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

#[derive(Clone)]
pub struct FakeUpstream {
    pub base: Url,
    shared: Shared,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let shared = Shared::default();
        let handler_state = shared.clone();
        let app = Router::new().fallback(move |req: Request<Body>| {
            let shared = handler_state.clone();
            let path = req.uri().path().to_string();
            let user_agent = req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            async move { respond(shared, path, user_agent).await }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: Url::parse(&format!("http://{addr}/")).unwrap(),
            shared,
        }
    }

    /// Absolute URL of `path` on this server
    pub fn url(&self, path: &str) -> String {
        self.base.join(path.trim_start_matches('/')).unwrap().to_string()
    }

    pub fn serve(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.insert(path, StatusCode::OK, body.into(), None);
    }

    /// Announces all of `body` in `Content-Length` but breaks off after
    /// `sent` bytes
    pub fn serve_truncated(&self, path: &str, body: impl Into<Vec<u8>>, sent: usize) {
        self.shared.routes.lock().unwrap().insert(
            path.to_string(),
            Route {
                status: StatusCode::OK,
                body: body.into(),
                delay: None,
                cut_after: Some(sent),
            },
        );
    }

    pub fn serve_slowly(&self, path: &str, body: impl Into<Vec<u8>>, delay: Duration) {
        self.insert(path, StatusCode::OK, body.into(), Some(delay));
    }

    pub fn fail(&self, path: &str, status: StatusCode) {
        self.insert(path, status, b"upstream says no".to_vec(), None);
    }

    /// Answers `getPostThread` with `payload`
    pub fn serve_thread(&self, payload: &Value) {
        self.serve(THREAD_PATH, payload.to_string());
    }

    pub fn hits(&self, path: &str) -> usize {
        self.shared
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .count()
    }

    pub fn user_agents(&self) -> Vec<Option<String>> {
        self.shared
            .hits
            .lock()
            .unwrap()
            .iter()
            .map(|(_, ua)| ua.clone())
            .collect()
    }

    pub fn settings(&self, temp_dir: &Path) -> Settings {
        Settings {
            api_base: self.base.clone(),
            temp_dir: Some(temp_dir.to_path_buf()),
            ..Settings::default()
        }
    }

    pub fn downloader(&self, temp_dir: &Path) -> Downloader {
        Downloader::new(self.settings(temp_dir)).unwrap()
    }

    fn insert(&self, path: &str, status: StatusCode, body: Vec<u8>, delay: Option<Duration>) {
        self.shared
            .routes
            .lock()
            .unwrap()
            .insert(
                path.to_string(),
                Route {
                    status,
                    body,
                    delay,
                    cut_after: None,
                },
            );
    }
}

async fn respond(shared: Shared, path: String, user_agent: Option<String>) -> Response {
    shared.hits.lock().unwrap().push((path.clone(), user_agent));

    let route = shared.routes.lock().unwrap().get(&path).cloned();
    let Some(route) = route else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(delay) = route.delay {
        tokio::time::sleep(delay).await;
    }

    if let Some(sent) = route.cut_after {
        let full_len = route.body.len();
        let head = Bytes::copy_from_slice(&route.body[..sent.min(full_len)]);
        let chunks: Vec<io::Result<Bytes>> =
            vec![Ok(head), Err(io::Error::other("upstream hung up"))];

        let mut response = Body::from_stream(stream::iter(chunks)).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(full_len));
        return response;
    }

    (route.status, route.body).into_response()
}

/// Number of entries left in a directory
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// Deterministic, distinguishable payload for segment `index`
pub fn segment_bytes(index: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from((index * 31 + i) % 251).unwrap()).collect()
}
