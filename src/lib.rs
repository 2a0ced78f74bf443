#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

pub mod assemble;
pub mod bsky;
pub mod config;
pub mod direct;
pub mod downloader;
pub mod error;
pub mod ffmpeg;
pub mod hls;
pub mod locator;
pub mod server;
pub mod util;

pub use downloader::{Delivery, Downloader};
pub use error::DownloadError;
