//! Dialect-agnostic RSS 2.0 / Atom parsing.
//!
//! Every field is resolved from an ordered list of candidate locations; the
//! first non-empty value wins. The tables below are the single source of
//! truth for tag precedence.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use super::error::FeedError;
use super::model::{Article, Channel, FeedPage};
use super::thumbnail::{normalize_thumbnail, ThumbnailSize};
use super::xml_tree::{parse_document, XmlNode};
use crate::util::{plain_text_preview, PREVIEW_MAX_CHARS};

/// One candidate location for a field value, relative to a channel or item.
#[derive(Debug, Clone, Copy)]
enum FieldPath {
    /// Text of the first child with this qualified name.
    Text(&'static str),
    /// Body of an Atom text construct; `type="xhtml"` bodies are re-serialized.
    Markup(&'static str),
    /// `href` of the first `link` with `rel="alternate"` (or no `rel`).
    AlternateLink,
    /// `href` of the first `link` carrying one, whatever its `rel`.
    AnyLinkHref,
}

const CHANNEL_TITLE: &[FieldPath] = &[FieldPath::Text("title")];
const CHANNEL_DESCRIPTION: &[FieldPath] =
    &[FieldPath::Text("subtitle"), FieldPath::Text("description")];
const CHANNEL_LINK: &[FieldPath] = &[
    FieldPath::AlternateLink,
    FieldPath::Text("link"),
    FieldPath::AnyLinkHref,
];

const ITEM_TITLE: &[FieldPath] = &[FieldPath::Text("title")];
const ITEM_LINK: &[FieldPath] = &[
    FieldPath::AlternateLink,
    FieldPath::Text("link"),
    FieldPath::AnyLinkHref,
];
const ITEM_PUBLISHED: &[FieldPath] = &[
    FieldPath::Text("pubDate"),
    FieldPath::Text("published"),
    FieldPath::Text("updated"),
    FieldPath::Text("dc:date"),
];
const ITEM_ID: &[FieldPath] = &[FieldPath::Text("guid"), FieldPath::Text("id")];
const ITEM_CONTENT: &[FieldPath] = &[
    FieldPath::Text("content:encoded"),
    FieldPath::Markup("content"),
    FieldPath::Text("description"),
    FieldPath::Markup("summary"),
];

impl FieldPath {
    fn extract(self, node: &XmlNode) -> Option<String> {
        match self {
            FieldPath::Text(name) => node.child(name).map(XmlNode::text),
            FieldPath::Markup(name) => node.child(name).map(|n| match n.attr("type") {
                Some("xhtml") => n.inner_markup(),
                _ => n.text(),
            }),
            FieldPath::AlternateLink => node
                .children("link")
                .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
                .and_then(|l| l.attr("href"))
                .map(str::to_string),
            FieldPath::AnyLinkHref => node
                .children("link")
                .find_map(|l| l.attr("href"))
                .map(str::to_string),
        }
    }
}

/// Returns the first non-empty value among `paths`.
fn resolve(node: &XmlNode, paths: &[FieldPath]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| path.extract(node))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Sources consulted, in order, for an item's thumbnail.
#[derive(Debug, Clone, Copy)]
enum ThumbnailSource {
    /// `<media:content url=…>`, directly or inside `<media:group>`.
    MediaContent,
    /// `<media:thumbnail url=…>`
    MediaThumbnail,
    /// `<enclosure type="image/…" url=…>`
    ImageEnclosure,
    /// First `<img src=…>` in the resolved body. Last resort.
    FirstImageInContent,
}

const THUMBNAIL_SOURCES: &[ThumbnailSource] = &[
    ThumbnailSource::MediaContent,
    ThumbnailSource::MediaThumbnail,
    ThumbnailSource::ImageEnclosure,
    ThumbnailSource::FirstImageInContent,
];

impl ThumbnailSource {
    fn extract(self, item: &XmlNode, content: &str) -> Option<String> {
        match self {
            ThumbnailSource::MediaContent => media_url(item, "media:content"),
            ThumbnailSource::MediaThumbnail => media_url(item, "media:thumbnail"),
            ThumbnailSource::ImageEnclosure => item
                .children("enclosure")
                .find(|e| e.attr("type").is_some_and(|t| t.starts_with("image/")))
                .and_then(|e| e.attr("url"))
                .map(str::to_string),
            ThumbnailSource::FirstImageInContent => first_img_src(content),
        }
    }
}

fn media_url(item: &XmlNode, name: &str) -> Option<String> {
    let direct = item.children(name);
    let grouped = item
        .children("media:group")
        .flat_map(move |group| group.children(name));
    direct
        .chain(grouped)
        .find_map(|n| n.attr("url").filter(|u| !u.trim().is_empty()))
        .map(|u| u.trim().to_string())
}

fn first_img_src(html: &str) -> Option<String> {
    static IMG: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = IMG
        .get_or_init(|| Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).ok())
        .as_ref()?;
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|src| !src.is_empty())
}

fn resolve_thumbnail(item: &XmlNode, content: &str) -> Option<String> {
    THUMBNAIL_SOURCES
        .iter()
        .find_map(|source| source.extract(item, content))
        .map(|url| normalize_thumbnail(&url, ThumbnailSize::Card))
}

/// Parses raw feed bytes into a channel summary and its articles.
///
/// A top-level `<feed>` element marks Atom; otherwise the document must
/// contain an RSS `<channel>` (RSS 1.0 `rdf:RDF` documents, whose items are
/// siblings of the channel, are accepted too). `source_url` fills in the
/// channel link when the feed omits one.
///
/// Each `<item>`/`<entry>` yields exactly one article, in document order.
/// Duplicate guids are kept; deduplication belongs to the poller.
///
/// # Errors
///
/// Returns [`FeedError::MalformedFeed`] if the bytes are not well-formed XML
/// or have no recognizable channel/feed root.
pub fn parse_feed(bytes: &[u8], source_url: &str) -> Result<FeedPage, FeedError> {
    let root = parse_document(bytes).map_err(FeedError::MalformedFeed)?;

    let (channel_node, items): (&XmlNode, Vec<&XmlNode>) = if root.local_name() == "feed" {
        (&root, root.children("entry").collect())
    } else {
        let channel = if root.name == "channel" {
            &root
        } else {
            root.child("channel").ok_or_else(|| {
                FeedError::MalformedFeed(format!(
                    "no <channel> or <feed> element (root is <{}>)",
                    root.name
                ))
            })?
        };
        let mut items: Vec<&XmlNode> = channel.children("item").collect();
        if items.is_empty() {
            items = root.children("item").collect();
        }
        (channel, items)
    };

    let channel = Channel {
        title: resolve(channel_node, CHANNEL_TITLE).unwrap_or_default(),
        description: resolve(channel_node, CHANNEL_DESCRIPTION).unwrap_or_default(),
        link: resolve(channel_node, CHANNEL_LINK).unwrap_or_else(|| source_url.to_string()),
    };

    let articles = items.into_iter().map(parse_item).collect();

    Ok(FeedPage { channel, articles })
}

fn parse_item(item: &XmlNode) -> Article {
    let link = resolve(item, ITEM_LINK).unwrap_or_default();
    let title = resolve(item, ITEM_TITLE).unwrap_or_default();
    let published_at = resolve(item, ITEM_PUBLISHED).unwrap_or_default();
    let content = resolve(item, ITEM_CONTENT).unwrap_or_default();

    let guid = resolve(item, ITEM_ID)
        .or_else(|| (!link.is_empty()).then(|| link.clone()))
        .unwrap_or_else(|| synthesize_guid(&title, &published_at));

    Article {
        guid,
        description: plain_text_preview(&content, PREVIEW_MAX_CHARS),
        thumbnail: resolve_thumbnail(item, &content),
        link,
        title,
        published_at,
        content,
        is_new: false,
    }
}

/// Deterministic id for items with neither an id nor a link.
fn synthesize_guid(title: &str, published: &str) -> String {
    let hash = Sha256::digest(format!("{title}|{published}").as_bytes());
    format!("{:x}", hash)
}
