//! Short-TTL, process-wide cache of parsed feed pages.
//!
//! Entries are immutable once written and shared through `Arc`, so a hit
//! hands back exactly what was stored. Expiry is checked on read; expired
//! entries are dropped lazily or by [`FeedCache::evict_expired`].

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::feed::{FeedPage, PageRequest};

/// Default TTL for parsed pages (30 seconds)
pub const DEFAULT_PAGE_TTL: Duration = Duration::from_secs(30);

/// Default maximum number of cached pages
pub const DEFAULT_CAPACITY: usize = 512;

const MAX_SLUG_LEN: usize = 80;

/// Deterministic key for one page of one feed.
///
/// Built from a normalized form of the feed URL (lowercased scheme and
/// host, no fragment, pagination parameters removed, remaining query pairs
/// sorted), the logical page number, and the page size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(url: &Url, page: PageRequest) -> Self {
        let normalized = normalize_url(url);
        let slug = slugify(&normalized);
        let digest = Sha256::digest(normalized.as_bytes());
        let short_hash: String = digest[..6].iter().map(|b| format!("{b:02x}")).collect();
        Self(format!(
            "{slug}-{short_hash}:p{}:n{}",
            page.page_number(),
            page.max_results
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(path.trim_end_matches('/'));
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "start-index" && k != "max-results")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        normalized.set_query(None);
    } else {
        normalized.query_pairs_mut().clear().extend_pairs(pairs);
    }

    normalized.to_string()
}

/// Lowercase ASCII alphanumerics joined by single dashes.
fn slugify(s: &str) -> String {
    let s = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s);
    let mut slug = String::with_capacity(s.len().min(MAX_SLUG_LEN));
    for c in s.chars() {
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

struct CacheEntry {
    page: Arc<FeedPage>,
    expires_at: Instant,
}

/// Bounded LRU of parsed pages with per-entry TTL.
///
/// Concurrent misses for the same key may both fetch and both write; the
/// last write wins.
pub struct FeedCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl FeedCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        // A panic while holding the lock cannot leave an entry half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the stored page if present and not yet expired.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<FeedPage>> {
        let mut entries = self.lock();
        let now = Instant::now();
        let found = entries
            .get(key)
            .map(|entry| (entry.expires_at > now, Arc::clone(&entry.page)));
        match found {
            Some((true, page)) => Some(page),
            Some((false, _)) => {
                entries.pop(key);
                tracing::trace!(key = %key.as_str(), "Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Stores `page` under `key` for `ttl`, replacing any previous entry.
    pub fn put(&self, key: CacheKey, page: Arc<FeedPage>, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.lock().put(key, CacheEntry { page, expires_at });
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Article, Channel};
    use pretty_assertions::assert_eq;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn sample_page() -> Arc<FeedPage> {
        Arc::new(FeedPage {
            channel: Channel {
                title: "Cache Test".into(),
                description: "desc".into(),
                link: "https://example.com/".into(),
            },
            articles: vec![Article {
                guid: "g1".into(),
                link: "https://example.com/1".into(),
                title: "One".into(),
                published_at: "Mon, 21 Oct 2024 07:28:00 GMT".into(),
                description: "Body".into(),
                content: "<p>Body</p>".into(),
                thumbnail: None,
                is_new: false,
            }],
        })
    }

    #[test]
    fn test_key_distinguishes_pages_and_sizes() {
        let feed = url("https://blog.example.com/feeds/posts/default");
        let p1 = CacheKey::new(&feed, PageRequest::first(25));
        let p2 = CacheKey::new(&feed, PageRequest::first(25).next());
        let poll = CacheKey::new(&feed, PageRequest::first(5));
        assert_ne!(p1, p2);
        assert_ne!(p1, poll);
        assert!(p1.as_str().starts_with("blog-example-com-feeds-posts-default-"));
        assert!(p1.as_str().ends_with(":p1:n25"));
    }

    #[test]
    fn test_key_normalizes_url() {
        let page = PageRequest::first(25);
        let a = CacheKey::new(&url("HTTPS://Example.COM/feed/?b=2&a=1#top"), page);
        let b = CacheKey::new(&url("https://example.com/feed?a=1&b=2"), page);
        let c = CacheKey::new(&url("https://example.com/feed?a=1&b=2&start-index=1&max-results=25"), page);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_key_slug_collisions_separated_by_hash() {
        let page = PageRequest::first(25);
        let a = CacheKey::new(&url("https://example.com/a-b"), page);
        let b = CacheKey::new(&url("https://example.com/a/b"), page);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_put_then_get_returns_identical_page() {
        let cache = FeedCache::default();
        let key = CacheKey::new(&url("https://example.com/rss"), PageRequest::first(25));
        let page = sample_page();

        cache.put(key.clone(), Arc::clone(&page), DEFAULT_PAGE_TTL);
        let hit = cache.get(&key).expect("fresh entry should hit");
        assert_eq!(*hit, *page);
        assert!(Arc::ptr_eq(&hit, &page));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_misses() {
        let cache = FeedCache::default();
        let key = CacheKey::new(&url("https://example.com/rss"), PageRequest::first(25));
        cache.put(key.clone(), sample_page(), DEFAULT_PAGE_TTL);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get(&key).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired() {
        let cache = FeedCache::default();
        let short = CacheKey::new(&url("https://example.com/a"), PageRequest::first(25));
        let long = CacheKey::new(&url("https://example.com/b"), PageRequest::first(25));
        cache.put(short, sample_page(), Duration::from_secs(10));
        cache.put(long.clone(), sample_page(), Duration::from_secs(600));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&long).is_some());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = FeedCache::new(2);
        let keys: Vec<CacheKey> = ["a", "b", "c"]
            .iter()
            .map(|p| CacheKey::new(&url(&format!("https://example.com/{p}")), PageRequest::first(25)))
            .collect();
        for key in &keys {
            cache.put(key.clone(), sample_page(), DEFAULT_PAGE_TTL);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&keys[0]).is_none());
        assert!(cache.get(&keys[2]).is_some());
    }
}
