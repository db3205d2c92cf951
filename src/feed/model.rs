use serde::{Deserialize, Serialize};

use super::thumbnail::{normalize_thumbnail, ThumbnailSize};

/// One syndicated item, normalized across RSS and Atom.
///
/// `published_at` keeps the feed-native date string (RFC 822 for RSS,
/// RFC 3339 for Atom); display formatting is left to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Stable identifier used for deduplication. Falls back to `link`.
    pub guid: String,
    pub link: String,
    pub title: String,
    pub published_at: String,
    /// Plain-text preview derived from `content`, at most 250 characters.
    pub description: String,
    /// Full HTML body, stored as an opaque string.
    pub content: String,
    /// Card-sized thumbnail URL, if one could be found.
    pub thumbnail: Option<String>,
    /// Set only when the poller discovered this article after the initial load.
    #[serde(default)]
    pub is_new: bool,
}

impl Article {
    /// The thumbnail rewritten to the larger hero-image size.
    pub fn hero_image(&self) -> Option<String> {
        self.thumbnail
            .as_deref()
            .map(|url| normalize_thumbnail(url, ThumbnailSize::Hero))
    }
}

/// Feed-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub title: String,
    pub description: String,
    pub link: String,
}

/// The normalized result of fetching and parsing one page of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    pub channel: Channel,
    pub articles: Vec<Article>,
}
