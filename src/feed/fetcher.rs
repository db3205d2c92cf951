use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::error::FeedError;
use crate::util::{validate_url, HostPolicy, UrlValidationError};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 10;

/// Desktop browser user agent; naive bot filters reject library defaults.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const ACCEPT_FEEDS: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.9, text/html;q=0.8, */*;q=0.7";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Raw response of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Vec<u8>,
    /// `Content-Type` as sent by the origin, if any.
    pub content_type: Option<String>,
    /// URL after redirects.
    pub final_url: String,
}

/// Settings for building a [`FeedFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub user_agent: String,
    /// Forwarding relay; requests become `GET <relay>?url=<target>`.
    pub relay_url: Option<Url>,
    pub host_policy: HostPolicy,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            relay_url: None,
            host_policy: HostPolicy::PublicOnly,
        }
    }
}

/// Retrieves raw feed bytes, directly or through a forwarding relay.
///
/// Sends browser-like headers and follows up to 10 redirects. Never retries:
/// every failure is reported once and retry policy is left to the caller.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    relay_url: Option<Url>,
    host_policy: HostPolicy,
}

/// Error body returned by the relay endpoint.
#[derive(Deserialize)]
struct RelayErrorBody {
    message: String,
}

impl FeedFetcher {
    /// Builds a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Transport`] if the TLS backend cannot be initialized.
    pub fn new(settings: FetcherSettings) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent)
            .redirect(redirect_policy(settings.host_policy))
            .build()?;
        Ok(Self::with_client(client, settings.relay_url, settings.host_policy))
    }

    /// Wraps an existing client (caller controls configuration).
    ///
    /// The client's redirect policy is used as-is; build it with
    /// [`redirect_policy`] to keep redirect targets under `host_policy`.
    pub fn with_client(client: reqwest::Client, relay_url: Option<Url>, host_policy: HostPolicy) -> Self {
        Self {
            client,
            relay_url,
            host_policy,
        }
    }

    pub fn host_policy(&self) -> HostPolicy {
        self.host_policy
    }

    /// Fetches `url` and checks the body looks like XML or HTML.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidUrl`] - not an absolute http(s) URL, or host disallowed
    /// - [`FeedError::Transport`] - DNS, connection, or TLS failure
    /// - [`FeedError::Origin`] - non-2xx status from the origin or relay
    /// - [`FeedError::NotAFeed`] - body failed the markup sniff
    /// - [`FeedError::ResponseTooLarge`] / [`FeedError::IncompleteResponse`]
    pub async fn fetch(&self, url: &str) -> Result<FetchedBody, FeedError> {
        let body = self.fetch_raw(url).await?;
        if !looks_like_markup(body.content_type.as_deref(), &body.bytes) {
            return Err(FeedError::NotAFeed {
                content_type: body
                    .content_type
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }
        Ok(body)
    }

    /// Fetches `url` without judging the body. Used by the relay endpoint.
    pub async fn fetch_raw(&self, url: &str) -> Result<FetchedBody, FeedError> {
        let target = validate_url(url, self.host_policy)?;
        let request_url = match &self.relay_url {
            Some(relay) => {
                let mut relayed = relay.clone();
                relayed.query_pairs_mut().append_pair("url", target.as_str());
                relayed
            }
            None => target.clone(),
        };

        tracing::debug!(
            feed = %target,
            relayed = self.relay_url.is_some(),
            "Fetching feed"
        );

        let response = self
            .client
            .get(request_url)
            .headers(browser_headers(&target))
            .send()
            .await
            .map_err(redirect_rejection)?;

        let status = response.status();
        if !status.is_success() {
            let status_text = origin_status_text(response).await;
            tracing::debug!(feed = %target, status = status.as_u16(), "Origin returned error status");
            return Err(FeedError::Origin {
                status: status.as_u16(),
                status_text,
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().to_string();
        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;

        Ok(FetchedBody {
            bytes,
            content_type,
            final_url,
        })
    }
}

// ============================================================================
// Redirects
// ============================================================================

/// Redirect policy that re-applies `host_policy` to every hop.
///
/// - Limits redirects to 10 hops
/// - Detects redirect loops (same URL appearing twice in chain)
/// - SEC-004: a public feed must not bounce the fetch onto a private host
pub fn redirect_policy(host_policy: HostPolicy) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {MAX_REDIRECTS})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        if let Err(reason) = validate_url(url.as_str(), host_policy) {
            tracing::warn!(to = %url, error = %reason, "Refusing redirect");
            let refused = RedirectRefused {
                target: url.to_string(),
                reason,
            };
            return attempt.error(refused);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

#[derive(Debug, Error)]
#[error("redirect to {target} refused: {reason}")]
struct RedirectRefused {
    target: String,
    reason: UrlValidationError,
}

/// Maps a redirect refused by the host policy to [`FeedError::InvalidUrl`];
/// everything else stays a transport error.
fn redirect_rejection(err: reqwest::Error) -> FeedError {
    if err.is_redirect() {
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            if let Some(refused) = inner.downcast_ref::<RedirectRefused>() {
                return FeedError::InvalidUrl(refused.to_string());
            }
            source = inner.source();
        }
    }
    FeedError::Transport(err)
}

/// Headers a desktop browser would send when following a link to `target`.
fn browser_headers(target: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_FEEDS));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    if let Some(host) = target.host_str() {
        let referer = match target.port() {
            Some(port) => format!("{}://{}:{}/", target.scheme(), host, port),
            None => format!("{}://{}/", target.scheme(), host),
        };
        if let Ok(value) = HeaderValue::from_str(&referer) {
            headers.insert(header::REFERER, value);
        }
    }
    headers
}

/// Human-readable reason for an error response. Prefers a relay's JSON
/// `{message}` body, falling back to the canonical reason phrase.
async fn origin_status_text(response: reqwest::Response) -> String {
    let status = response.status();
    let canonical = status.canonical_reason().unwrap_or("").to_string();
    match read_limited_bytes(response, 64 * 1024).await {
        Ok(body) => serde_json::from_slice::<RelayErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(canonical),
        Err(_) => canonical,
    }
}

/// XML/HTML sniff: a markup content type, or a body whose first
/// non-whitespace character (after any BOM) is `<`.
pub(crate) fn looks_like_markup(content_type: Option<&str>, body: &[u8]) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("xml") || ct.contains("html") {
            return true;
        }
    }
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, FeedError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FeedError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FeedError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: A connection dropped mid-body shows up as a short read
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FeedError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
