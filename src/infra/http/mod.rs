mod decks;
mod middleware;
mod models;
mod views;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::application::decks::DeckService;
use crate::application::error::{ErrorReport, HttpError};
use crate::application::repos::RepoError;
use crate::application::views::DeckViewService;

pub use middleware::{REQUEST_ID_HEADER, RequestContext};

#[derive(Clone)]
pub struct HttpState {
    pub decks: Arc<DeckService>,
    pub views: Arc<DeckViewService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/decks/ensure", post(decks::ensure_deck))
        .route("/api/decks/{deckcode}", get(decks::get_deck))
        .route(
            "/api/decks/{deckcode}/image",
            get(decks::get_deck_image).post(decks::render_deck_image),
        )
        .route("/api/decks/{deckcode}/views", post(views::record_view))
        .route("/api/resolve/{value}", get(decks::resolve_deck))
        .route("/api/views", get(views::view_counts))
        .route("/api/views/most-viewed", get(views::most_viewed))
        .route("/_health/db", get(db_health))
        .with_state(state)
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
}

async fn db_health(State(state): State<HttpState>) -> Response {
    match state.decks.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::Duplicate { constraint } => {
            HttpError::new(source, StatusCode::CONFLICT, "Duplicate record", constraint)
        }
        RepoError::NotFound => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "resource not found",
        ),
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Integrity { message } => HttpError::new(
            source,
            StatusCode::CONFLICT,
            "Integrity constraint violated",
            message,
        ),
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}
