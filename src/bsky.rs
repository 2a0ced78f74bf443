use std::sync::LazyLock;

use reqwest::Url;

pub mod api;
pub mod structs;
pub mod utils;

pub use api::get_post_thread;
pub use utils::{PostReference, extract_post_reference, metadata_url};

/// Public AppView host that answers unauthenticated `getPostThread` queries
pub const DEFAULT_API_BASE: &str = "https://public.api.bsky.app";

pub static DEFAULT_API_BASE_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse(DEFAULT_API_BASE).expect("DEFAULT_API_BASE is a valid URL"));
