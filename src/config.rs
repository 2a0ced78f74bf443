use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::Url;

use crate::{
    bsky::{DEFAULT_API_BASE, DEFAULT_API_BASE_URL},
    util::default_user_agent,
};

pub const DEFAULT_PORT: u16 = 3000;

/// Downloads the video embedded in a Bluesky post
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for `serve`, which is what runs when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,
}

impl Cli {
    #[must_use]
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serves `GET /download?url=<post url>` and the static site
    Serve(ServeArgs),

    /// Downloads a single post's video to a local file
    Fetch(FetchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Directory served as the site root; skipped if it doesn't exist
    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Bluesky post URL, e.g. `https://bsky.app/profile/<handle>/post/<id>`
    pub url: String,

    /// Where to write the video
    #[arg(short, long, default_value = "video.mp4")]
    pub output: PathBuf,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RemuxStrategy {
    /// Download segments ourselves and concatenate the bytes
    #[default]
    Concat,
    /// Hand the playlist URL to ffmpeg and copy streams into an mp4
    Ffmpeg,
}

/// Pipeline settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// AppView host answering `app.bsky.feed.getPostThread`
    #[arg(long, env = "BSKY_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: Url,

    /// User agent sent on every upstream request
    #[arg(long, env = "BSKY_USER_AGENT", default_value_t = default_user_agent())]
    pub user_agent: String,

    /// Seconds to wait for an upstream connection
    #[arg(long, env = "CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Seconds an upstream read may stall before the fetch is abandoned
    #[arg(long, env = "READ_TIMEOUT", default_value_t = 30)]
    pub read_timeout: u64,

    /// Playlist segments fetched at once. They are always written in order
    #[arg(long, env = "SEGMENT_CONCURRENCY", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub segment_concurrency: u16,

    /// How playlists are turned into a single file
    #[arg(long, env = "REMUX", value_enum, default_value_t = RemuxStrategy::Concat)]
    pub remux: RemuxStrategy,

    /// ffmpeg binary used by the `ffmpeg` remux strategy
    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Directory for assembled videos (defaults to system's temporary directory)
    #[arg(long, env = "TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Read the video from the post's embed before scanning the whole response
    #[arg(long, env = "PREFER_EMBED")]
    pub prefer_embed: bool,
}

impl Settings {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE_URL.clone(),
            user_agent: default_user_agent(),
            connect_timeout: 10,
            read_timeout: 30,
            segment_concurrency: 1,
            remux: RemuxStrategy::Concat,
            ffmpeg: PathBuf::from("ffmpeg"),
            temp_dir: None,
            prefer_embed: false,
        }
    }
}
