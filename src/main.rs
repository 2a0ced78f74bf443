#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result, bail, ensure};
use bsky_squirrel::{
    Downloader,
    config::{Cli, Command, FetchArgs, RemuxStrategy, ServeArgs, Settings},
    ffmpeg, server,
    util::spawn_ct_watcher,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "bsky_squirrel=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let ct = CancellationToken::new();
    spawn_ct_watcher(ct.clone());

    match Cli::parse().into_command() {
        Command::Serve(args) => serve(args, ct).await,
        Command::Fetch(args) => fetch(args, ct).await,
    }
}

async fn check_remux_backend(settings: &Settings) -> Result<()> {
    if settings.remux == RemuxStrategy::Ffmpeg {
        ensure!(
            ffmpeg::is_installed(&settings.ffmpeg).await,
            "ffmpeg is not installed at {}!",
            settings.ffmpeg.display()
        );
    }
    Ok(())
}

async fn serve(args: ServeArgs, ct: CancellationToken) -> Result<()> {
    check_remux_backend(&args.settings).await?;

    let downloader = Downloader::new(args.settings).context("Setting up downloader")?;
    info!(
        "Assembling playlists via {:?} in {:?} with {} parallel segment fetch(es)",
        downloader.settings().remux,
        downloader.settings().temp_dir(),
        downloader.settings().segment_concurrency
    );

    server::serve(
        SocketAddr::new(args.host, args.port),
        Arc::new(downloader),
        Some(&args.static_dir),
        ct,
    )
    .await
}

async fn fetch(args: FetchArgs, ct: CancellationToken) -> Result<()> {
    check_remux_backend(&args.settings).await?;
    let downloader = Downloader::new(args.settings).context("Setting up downloader")?;

    let segments = ProgressBar::new(0).with_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} segments")
            .context("Building progress bar")?,
    );
    let delivery = select! {
        () = ct.cancelled() => bail!("Cancelled before the video was ready"),
        delivery = downloader.deliver(&args.url, &segments) => delivery.context("Downloading video")?,
    };
    segments.finish_and_clear();

    info!("Writing video to {:?}", args.output);
    let progress = delivery
        .content_length
        .map_or_else(ProgressBar::new_spinner, ProgressBar::new);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )
        .context("Building progress bar")?,
    );
    delivery.save(&args.output, &progress, &ct).await?;
    progress.finish_and_clear();

    info!("All done successfully!");
    Ok(())
}
