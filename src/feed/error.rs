use thiserror::Error;

use crate::util::UrlValidationError;

/// Errors produced by the fetch → parse pipeline.
///
/// `Transport`, `ResponseTooLarge` and `IncompleteResponse` together form the
/// transport class: the origin never produced a usable response. `Origin`
/// means it answered with a non-2xx status. None of these are retried by the
/// engine itself.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Malformed, relative, or non-http(s) input; also disallowed hosts.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// DNS, connection, TLS or body-read failure.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Fewer bytes arrived than `Content-Length` announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The origin (or relay) answered with a non-2xx status.
    #[error("HTTP error: status {status} {status_text}")]
    Origin { status: u16, status_text: String },
    /// The body failed the XML/HTML sniff check.
    #[error("Response does not look like a feed (content-type: {content_type})")]
    NotAFeed { content_type: String },
    /// The body is not well-formed XML or has no channel/feed root.
    #[error("Malformed feed: {0}")]
    MalformedFeed(String),
}

impl FeedError {
    /// True for failures where the origin never produced a usable response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FeedError::Transport(_)
                | FeedError::ResponseTooLarge
                | FeedError::IncompleteResponse { .. }
        )
    }

    /// True if a manual retry later has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Origin { status, .. } => *status >= 500 || *status == 429,
            FeedError::Transport(_) | FeedError::IncompleteResponse { .. } => true,
            _ => false,
        }
    }

    /// Short user-facing hint for the error.
    pub fn user_guidance(&self) -> &'static str {
        match self {
            FeedError::InvalidUrl(_) => "Check the feed address; it must be an http(s) URL",
            FeedError::Origin { status: 404, .. } => {
                "Feed not found: the site is likely blocking access or the URL is wrong"
            }
            FeedError::Origin { status: 403, .. } => "The site explicitly blocked the request",
            FeedError::Origin { status, .. } if *status >= 500 => {
                "The site is having an outage; retry later"
            }
            FeedError::Origin { .. } => "The site refused the request",
            FeedError::NotAFeed { .. } | FeedError::MalformedFeed(_) => {
                "The address does not serve an RSS or Atom feed"
            }
            _ => "Could not reach the site; check your connection and retry",
        }
    }
}

impl From<UrlValidationError> for FeedError {
    fn from(err: UrlValidationError) -> Self {
        FeedError::InvalidUrl(err.to_string())
    }
}
