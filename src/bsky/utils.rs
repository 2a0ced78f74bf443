use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

pub static POST_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"profile/([^/]+)/post/([^/?#]+)").unwrap());

/// The two path components that identify a post: `bsky.app/profile/{user}/post/{post_id}`
///
/// Both are kept verbatim. `user` may be a handle or a DID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReference {
    pub user: String,
    pub post_id: String,
}

impl PostReference {
    /// AT-URI of the post record, as expected by `app.bsky.feed.getPostThread`
    #[must_use]
    pub fn at_uri(&self) -> String {
        format!("at://{}/app.bsky.feed.post/{}", self.user, self.post_id)
    }
}

/// Extracts the user and post ID out from a user-inputted post URL
///
/// Returns `None` when the URL doesn't look like a post permalink
#[must_use]
pub fn extract_post_reference(input: &str) -> Option<PostReference> {
    let captures = POST_URL_REGEX.captures(input)?;

    Some(PostReference {
        user: captures.get(1)?.as_str().to_string(),
        post_id: captures.get(2)?.as_str().to_string(),
    })
}

/// Builds the `getPostThread` query URL for a post on the given AppView host
///
/// The AT-URI goes through the query serializer so that odd handles can't
/// break out of the `uri` parameter.
#[must_use]
pub fn metadata_url(api_base: &Url, post: &PostReference) -> Url {
    let mut url = api_base.clone();
    url.set_path(&format!(
        "{}/xrpc/app.bsky.feed.getPostThread",
        api_base.path().trim_end_matches('/')
    ));
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("uri", &post.at_uri());

    url
}
