use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, Request, StatusCode},
};

use crate::application::error::HttpError;

use super::models::{
    DEFAULT_MOST_VIEWED, MostViewedParams, ViewCountResponse, ViewCountsParams, split_list,
};
use super::{HttpState, repo_error_to_http};

const FORWARDED_FOR: &str = "x-forwarded-for";

pub(super) async fn record_view(
    State(state): State<HttpState>,
    Path(deckcode): Path<String>,
    request: Request<Body>,
) -> Result<StatusCode, HttpError> {
    const SOURCE: &str = "infra::http::views::record_view";

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_address(request.headers(), peer);

    state
        .views
        .increment_view(&deckcode, &client)
        .await
        .map_err(|err| repo_error_to_http(SOURCE, err))?;

    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn most_viewed(
    State(state): State<HttpState>,
    Query(params): Query<MostViewedParams>,
) -> Result<Json<Vec<ViewCountResponse>>, HttpError> {
    const SOURCE: &str = "infra::http::views::most_viewed";

    let factions = split_list(params.factions.as_deref());
    let decks = state
        .views
        .most_viewed(
            params.count.unwrap_or(DEFAULT_MOST_VIEWED),
            params.since_days_ago,
            &factions,
        )
        .await
        .map_err(|err| repo_error_to_http(SOURCE, err))?;

    Ok(Json(decks.into_iter().map(ViewCountResponse::from).collect()))
}

pub(super) async fn view_counts(
    State(state): State<HttpState>,
    Query(params): Query<ViewCountsParams>,
) -> Result<Json<HashMap<String, u64>>, HttpError> {
    const SOURCE: &str = "infra::http::views::view_counts";

    let deckcodes = split_list(params.deckcodes.as_deref());
    let counts = state
        .views
        .view_counts(&deckcodes)
        .await
        .map_err(|err| repo_error_to_http(SOURCE, err))?;

    Ok(Json(counts))
}

/// First hop of `X-Forwarded-For`, falling back to the socket peer.
fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        let peer: SocketAddr = "10.0.0.2:5555".parse().unwrap();

        assert_eq!(client_address(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn peer_address_without_forwarding() {
        let peer: SocketAddr = "10.0.0.2:5555".parse().unwrap();
        assert_eq!(client_address(&HeaderMap::new(), Some(peer)), "10.0.0.2");
        assert_eq!(client_address(&HeaderMap::new(), None), "unknown");
    }
}
