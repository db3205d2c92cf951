use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::error::FeedError;
use super::fetcher::FeedFetcher;
use super::model::FeedPage;
use super::pagination::{page_url, supports_pagination, PageRequest};
use super::parser::parse_feed;
use crate::cache::{CacheKey, FeedCache};
use crate::util::validate_url;

/// Whether a page came out of the cache or from the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    /// Value of the `X-Cache` response header.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Anything that can produce one parsed page of a feed.
///
/// The session engine talks to this seam so it can be driven by an
/// in-process fake in tests.
pub trait FeedSource: Send + Sync + 'static {
    fn load_page(
        &self,
        url: &str,
        page: PageRequest,
    ) -> impl Future<Output = Result<Arc<FeedPage>, FeedError>> + Send;
}

/// Fetch → parse pipeline in front of a [`FeedCache`].
#[derive(Clone)]
pub struct CachedFeedLoader {
    fetcher: FeedFetcher,
    cache: Arc<FeedCache>,
    ttl: Duration,
}

impl CachedFeedLoader {
    pub fn new(fetcher: FeedFetcher, cache: Arc<FeedCache>, ttl: Duration) -> Self {
        Self { fetcher, cache, ttl }
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub fn fetcher(&self) -> &FeedFetcher {
        &self.fetcher
    }

    /// Loads one page, serving it from the cache while fresh.
    ///
    /// Feeds whose URL does not support pagination are always fetched as-is;
    /// the page window then only affects the cache key.
    ///
    /// # Errors
    ///
    /// Any [`FeedError`] from validation, fetch or parse. Failures are never
    /// cached.
    pub async fn load(
        &self,
        url: &str,
        page: PageRequest,
    ) -> Result<(Arc<FeedPage>, CacheStatus), FeedError> {
        let feed_url = validate_url(url, self.fetcher.host_policy())?;
        let key = CacheKey::new(&feed_url, page);

        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(key = %key.as_str(), "Feed page cache hit");
            return Ok((cached, CacheStatus::Hit));
        }

        let request_url = if supports_pagination(feed_url.as_str()) {
            page_url(&feed_url, page)
        } else {
            feed_url.clone()
        };

        let body = self.fetcher.fetch(request_url.as_str()).await?;
        let parsed = parse_feed(&body.bytes, feed_url.as_str())?;
        let parsed = Arc::new(parsed);

        tracing::debug!(
            key = %key.as_str(),
            articles = parsed.articles.len(),
            "Feed page cache miss, stored"
        );
        self.cache.put(key, Arc::clone(&parsed), self.ttl);
        Ok((parsed, CacheStatus::Miss))
    }
}

impl FeedSource for CachedFeedLoader {
    async fn load_page(&self, url: &str, page: PageRequest) -> Result<Arc<FeedPage>, FeedError> {
        self.load(url, page).await.map(|(page, _)| page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::FetcherSettings;
    use crate::util::HostPolicy;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Loader Test</title>
    <item><guid>a</guid><title>A</title><description>first</description></item>
    <item><guid>b</guid><title>B</title><description>second</description></item>
</channel></rss>"#;

    fn loader() -> CachedFeedLoader {
        let fetcher = FeedFetcher::new(FetcherSettings {
            host_policy: HostPolicy::AllowPrivate,
            ..FetcherSettings::default()
        })
        .unwrap();
        CachedFeedLoader::new(fetcher, Arc::new(FeedCache::default()), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_second_load_is_cache_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(RSS, "application/rss+xml"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let loader = loader();
        let url = format!("{}/rss.xml", server.uri());
        let (first, status) = loader.load(&url, PageRequest::first(25)).await.unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(first.channel.title, "Loader Test");

        let (second, status) = loader.load(&url, PageRequest::first(25)).await.unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn test_paginated_feed_gets_window_params() {
        let server = MockServer::start().await;
        Mock::given(path("/feeds/posts/default"))
            .and(query_param("start-index", "26"))
            .and(query_param("max-results", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/feeds/posts/default", server.uri());
        let (page, _) = loader().load(&url, PageRequest::new(26, 25)).await.unwrap();
        assert_eq!(page.articles.len(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let loader = loader();
        let url = format!("{}/rss.xml", server.uri());
        for _ in 0..2 {
            let err = loader.load(&url, PageRequest::first(25)).await.unwrap_err();
            assert!(matches!(err, FeedError::Origin { status: 502, .. }));
        }
        assert!(loader.cache().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let err = loader()
            .load("/relative/feed", PageRequest::first(25))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::InvalidUrl(_)));
    }

    #[test]
    fn test_cache_status_header_values() {
        assert_eq!(CacheStatus::Hit.as_str(), "HIT");
        assert_eq!(CacheStatus::Miss.as_str(), "MISS");
    }
}
