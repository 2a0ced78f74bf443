//! Playlist reassembly against a fake segment host

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use bsky_squirrel::{
    DownloadError, Downloader,
    assemble::concat_segments,
    config::Settings,
    hls::{Manifest, get_manifest},
    locator::MediaKind,
};
use bytes::Bytes;
use common::{FakeUpstream, POST_URL, file_count, segment_bytes};
use futures_util::TryStreamExt;
use indicatif::ProgressBar;
use indoc::indoc;
use serde_json::json;
use tempfile::tempdir;

fn manifest(upstream: &FakeUpstream, count: usize) -> Manifest {
    Manifest {
        url: upstream.url("/hls/stream.m3u8"),
        segments: (0..count)
            .map(|i| upstream.url(&format!("/hls/seg{i}.ts")))
            .collect(),
    }
}

fn serve_segments(upstream: &FakeUpstream, sizes: &[usize]) -> Vec<Vec<u8>> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            let bytes = segment_bytes(i, len);
            upstream.serve(&format!("/hls/seg{i}.ts"), bytes.clone());
            bytes
        })
        .collect()
}

async fn read_all(delivery: bsky_squirrel::Delivery) -> Vec<u8> {
    let chunks = delivery.body.try_collect::<Vec<Bytes>>().await.unwrap();
    chunks.concat()
}

#[tokio::test]
async fn output_is_segments_concatenated_in_order() {
    let upstream = FakeUpstream::start().await;
    let dir = tempdir().unwrap();
    let sizes = [4096, 1, 333, 8192, 17];
    let segments = serve_segments(&upstream, &sizes);

    let client = reqwest::Client::new();
    let progress = ProgressBar::hidden();
    let output = concat_segments(
        &client,
        &manifest(&upstream, sizes.len()),
        dir.path(),
        1,
        &progress,
    )
    .await
    .unwrap();

    assert_eq!(output.len(), sizes.iter().sum::<usize>() as u64);
    assert_eq!(progress.position(), 5);
    assert_eq!(std::fs::read(output.path()).unwrap(), segments.concat());
}

#[tokio::test]
async fn parallel_fetches_are_written_in_manifest_order() {
    let upstream = FakeUpstream::start().await;
    let dir = tempdir().unwrap();
    let segments = serve_segments(&upstream, &[100, 200, 300, 400]);

    // The first segment finishes last
    upstream.serve_slowly("/hls/seg0.ts", segments[0].clone(), Duration::from_millis(300));

    let client = reqwest::Client::new();
    let output = concat_segments(
        &client,
        &manifest(&upstream, 4),
        dir.path(),
        4,
        &ProgressBar::hidden(),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read(output.path()).unwrap(), segments.concat());
}

#[tokio::test]
async fn failed_segment_aborts_and_removes_partial_output() {
    let upstream = FakeUpstream::start().await;
    let dir = tempdir().unwrap();
    serve_segments(&upstream, &[10, 10, 10, 10, 10]);
    upstream.fail("/hls/seg1.ts", StatusCode::INTERNAL_SERVER_ERROR);

    let client = reqwest::Client::new();
    let err = concat_segments(
        &client,
        &manifest(&upstream, 5),
        dir.path(),
        1,
        &ProgressBar::hidden(),
    )
    .await
    .unwrap_err();

    let DownloadError::SegmentFetch { index, url, .. } = err else {
        panic!("expected a segment failure, got {err:?}");
    };
    assert_eq!(index, 1);
    assert!(url.ends_with("/hls/seg1.ts"));

    assert_eq!(file_count(dir.path()), 0);
    // No retries, no skipping ahead
    assert_eq!(upstream.hits("/hls/seg1.ts"), 1);
    assert_eq!(upstream.hits("/hls/seg2.ts"), 0);
    assert_eq!(upstream.hits("/hls/seg4.ts"), 0);
}

#[tokio::test]
async fn unreachable_segment_is_a_segment_failure() {
    let upstream = FakeUpstream::start().await;
    let dir = tempdir().unwrap();
    serve_segments(&upstream, &[10]);

    let manifest = Manifest {
        url: upstream.url("/hls/stream.m3u8"),
        segments: vec![
            upstream.url("/hls/seg0.ts"),
            "http://127.0.0.1:1/unreachable.ts".to_string(),
        ],
    };

    let err = concat_segments(
        &reqwest::Client::new(),
        &manifest,
        dir.path(),
        1,
        &ProgressBar::hidden(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::SegmentFetch { index: 1, .. }));
    assert_eq!(file_count(dir.path()), 0);
}

#[tokio::test]
async fn dropped_request_removes_output_mid_assembly() {
    let upstream = FakeUpstream::start().await;
    let dir = tempdir().unwrap();
    serve_segments(&upstream, &[10, 10]);
    upstream.serve_slowly("/hls/seg1.ts", segment_bytes(1, 10), Duration::from_secs(30));

    let manifest = manifest(&upstream, 2);
    let temp_dir = dir.path().to_path_buf();
    let task = tokio::spawn(async move {
        concat_segments(
            &reqwest::Client::new(),
            &manifest,
            &temp_dir,
            1,
            &ProgressBar::hidden(),
        )
        .await
    });

    // Wait until the slow segment is being fetched
    for _ in 0..100 {
        if upstream.hits("/hls/seg1.ts") == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(upstream.hits("/hls/seg1.ts"), 1);
    assert_eq!(file_count(dir.path()), 1);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(file_count(dir.path()), 0);
}

#[tokio::test]
async fn master_playlist_is_followed_to_first_variant() {
    let upstream = FakeUpstream::start().await;
    upstream.serve(
        "/watch/abc/playlist.m3u8",
        indoc! {r#"
            #EXTM3U
            #EXT-X-VERSION:3
            #EXT-X-STREAM-INF:BANDWIDTH=663000,RESOLUTION=640x360
            360p/video.m3u8
            #EXT-X-STREAM-INF:BANDWIDTH=2213000,RESOLUTION=1280x720
            720p/video.m3u8
        "#},
    );
    upstream.serve(
        "/watch/abc/360p/video.m3u8",
        indoc! {"
            #EXTM3U
            #EXT-X-TARGETDURATION:6
            #EXTINF:6.0,
            video0.ts
            #EXTINF:6.0,
            video1.ts
            #EXT-X-ENDLIST
        "},
    );

    let manifest = get_manifest(
        &reqwest::Client::new(),
        &upstream.url("/watch/abc/playlist.m3u8"),
    )
    .await
    .unwrap();

    assert_eq!(manifest.url, upstream.url("/watch/abc/360p/video.m3u8"));
    assert_eq!(
        manifest.segments,
        [
            upstream.url("/watch/abc/360p/video0.ts"),
            upstream.url("/watch/abc/360p/video1.ts"),
        ]
    );
    assert_eq!(upstream.hits("/watch/abc/720p/video.m3u8"), 0);
}

#[tokio::test]
async fn missing_playlist_is_a_playlist_failure() {
    let upstream = FakeUpstream::start().await;

    let err = get_manifest(&reqwest::Client::new(), &upstream.url("/nope.m3u8"))
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::PlaylistFetch { .. }));
}

#[tokio::test]
async fn downloader_resolves_and_delivers_playlist() {
    let upstream = FakeUpstream::start().await;
    let dir = tempdir().unwrap();
    let segments = serve_segments(&upstream, &[50, 60, 70]);
    upstream.serve("/hls/stream.m3u8", "seg0.ts\nseg1.ts\nseg2.ts\n");
    upstream.serve_thread(&json!({
        "thread": {
            "post": {
                "embed": {
                    "playlist": upstream.url("/hls/stream.m3u8"),
                    "thumbnail": upstream.url("/hls/thumbnail.jpg")
                }
            }
        }
    }));

    let downloader = Downloader::new(Settings {
        segment_concurrency: 3,
        ..upstream.settings(dir.path())
    })
    .unwrap();

    let candidate = downloader.resolve(POST_URL).await.unwrap();
    assert_eq!(candidate.kind, MediaKind::Playlist);
    assert_eq!(candidate.url, upstream.url("/hls/stream.m3u8"));

    let delivery = downloader
        .deliver(POST_URL, &ProgressBar::hidden())
        .await
        .unwrap();
    assert_eq!(delivery.content_length, Some(180));
    assert_eq!(read_all(delivery).await, segments.concat());
    assert_eq!(file_count(dir.path()), 0);
}

#[tokio::test]
async fn invalid_post_url_never_reaches_upstream() {
    let upstream = FakeUpstream::start().await;
    let dir = tempdir().unwrap();

    let err = upstream
        .downloader(dir.path())
        .resolve("https://bsky.app/search?q=video")
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::InvalidPostUrl(_)));
    assert!(upstream.user_agents().is_empty());
}
