//! HTTP surface: the raw `/relay` passthrough and the cached `/feed` endpoint.

mod feed;
mod relay;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::feed::{CachedFeedLoader, FeedError, FeedFetcher};

/// Cache lifetimes advertised on relayed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCachePolicy {
    /// Shared caches (`s-maxage`).
    pub server_ttl: Duration,
    /// Browsers (`max-age`).
    pub browser_ttl: Duration,
}

impl Default for RelayCachePolicy {
    fn default() -> Self {
        Self {
            server_ttl: Duration::from_secs(600),
            browser_ttl: Duration::from_secs(120),
        }
    }
}

impl RelayCachePolicy {
    fn header_value(&self) -> String {
        format!(
            "public, s-maxage={}, max-age={}",
            self.server_ttl.as_secs(),
            self.browser_ttl.as_secs()
        )
    }
}

/// Everything the handlers share.
pub struct ServerState {
    /// Parsed, cached pages for `/feed`.
    pub loader: CachedFeedLoader,
    /// Direct fetcher for `/relay`; must not itself be relayed.
    pub fetcher: FeedFetcher,
    pub relay_cache: RelayCachePolicy,
    /// `maxResults` used when the query omits it.
    pub default_page_size: usize,
}

/// Shared application state.
pub type AppState = Arc<ServerState>;

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/relay", get(relay::relay))
        .route("/feed", get(feed::feed_page))
        .with_state(state)
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// JSON error body, `{"message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let mut response = (status, Json(self)).into_response();
        allow_any_origin(&mut response);
        response
    }
}

/// Maps pipeline errors for `/feed`: bad input is the caller's fault,
/// anything else is reported as a server failure.
impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::InvalidUrl(msg) => ApiError::bad_request(msg),
            other => ApiError::internal(other.to_string()),
        }
    }
}

fn allow_any_origin(response: &mut Response) {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}
