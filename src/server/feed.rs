use axum::{
    extract::{Query, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::{allow_any_origin, ApiError, AppState};
use crate::feed::PageRequest;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FeedQuery {
    url: Option<String>,
    start_index: Option<String>,
    max_results: Option<String>,
}

/// `GET /feed?url=<feed>&startIndex=1&maxResults=25`
///
/// Responds with `{channel, articles}` and an `X-Cache: HIT|MISS` header.
pub(super) async fn feed_page(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required query parameter: url"))?;
    let start_index = parse_positive("startIndex", query.start_index.as_deref(), 1)?;
    let max_results = parse_positive(
        "maxResults",
        query.max_results.as_deref(),
        state.default_page_size,
    )?;

    let page = PageRequest::new(start_index, max_results);
    let (feed, status) = state.loader.load(&url, page).await.map_err(|e| {
        tracing::warn!(feed = %url, error = %e, "Feed request failed");
        ApiError::from(e)
    })?;

    let mut response = Json(&*feed).into_response();
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static(status.as_str()));
    allow_any_origin(&mut response);
    Ok(response)
}

fn parse_positive(name: &str, value: Option<&str>, default: usize) -> Result<usize, ApiError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ApiError::bad_request(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}
