use serde::{Deserialize, Serialize};

/// Response body of `app.bsky.feed.getPostThread`, reduced to the parts that
/// can carry a video
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostThreadResponse {
    pub thread: ThreadView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub post: Option<PostView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: Option<String>,
    pub embed: Option<EmbedView>,
}

/// Either an `app.bsky.embed.video#view` (has `playlist`) or an
/// `app.bsky.embed.recordWithMedia#view` (video nested under `media`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedView {
    #[serde(rename = "$type")]
    pub kind: Option<String>,
    pub playlist: Option<String>,
    pub thumbnail: Option<String>,
    pub media: Option<Box<EmbedView>>,
}

impl EmbedView {
    #[must_use]
    pub fn video_playlist(&self) -> Option<&str> {
        self.playlist
            .as_deref()
            .or_else(|| self.media.as_ref().and_then(|m| m.video_playlist()))
    }
}

impl PostThreadResponse {
    #[must_use]
    pub fn video_playlist(&self) -> Option<&str> {
        self.thread.post.as_ref()?.embed.as_ref()?.video_playlist()
    }
}
