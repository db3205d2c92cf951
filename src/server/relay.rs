use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use serde::Deserialize;

use super::{allow_any_origin, ApiError, AppState};
use crate::feed::FeedError;

const DEFAULT_CONTENT_TYPE: &str = "application/xml";

#[derive(Deserialize)]
pub(super) struct RelayQuery {
    url: Option<String>,
}

/// `GET /relay?url=<absolute http(s) URL>`
///
/// Returns the origin body untouched, mirroring its content type.
pub(super) async fn relay(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required query parameter: url"))?;

    let body = state.fetcher.fetch_raw(&url).await.map_err(|e| {
        tracing::debug!(feed = %url, error = %e, "Relay fetch failed");
        relay_error(e)
    })?;

    let content_type = body
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let cache_control = HeaderValue::from_str(&state.relay_cache.header_value())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut response = Response::new(Body::from(body.bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CACHE_CONTROL, cache_control);
    allow_any_origin(&mut response);
    Ok(response)
}

/// Origin failures keep the origin's status; transport failures are 500.
fn relay_error(err: FeedError) -> ApiError {
    match err {
        FeedError::InvalidUrl(msg) => ApiError::bad_request(msg),
        FeedError::Origin {
            status,
            status_text,
        } => ApiError {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message: if status_text.is_empty() {
                format!("Origin returned status {status}")
            } else {
                status_text
            },
        },
        other => ApiError::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_status_is_kept() {
        let err = relay_error(FeedError::Origin {
            status: 404,
            status_text: "Not Found".into(),
        });
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Not Found");
    }

    #[test]
    fn test_transport_class_is_500() {
        let err = relay_error(FeedError::ResponseTooLarge);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_url_is_400() {
        let err = relay_error(FeedError::InvalidUrl("bad".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
