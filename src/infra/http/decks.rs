use axum::{
    Json,
    extract::{Path, State},
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::application::error::HttpError;

use super::HttpState;
use super::models::{DeckResponse, EnsureDeckRequest};

pub(super) async fn get_deck(
    State(state): State<HttpState>,
    Path(deckcode): Path<String>,
) -> Result<Json<DeckResponse>, HttpError> {
    const SOURCE: &str = "infra::http::decks::get_deck";

    let record = state.decks.get_deck(&deckcode).await?;
    match record {
        Some(record) => Ok(Json(DeckResponse::from_record(
            record,
            state.decks.image_version(),
        ))),
        None => Err(deck_not_found(SOURCE, &deckcode)),
    }
}

pub(super) async fn resolve_deck(
    State(state): State<HttpState>,
    Path(value): Path<String>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::decks::resolve_deck";

    match state.decks.resolve_deck(&value).await? {
        Some(deck) => Ok(Json(deck).into_response()),
        None => Err(deck_not_found(SOURCE, &value)),
    }
}

pub(super) async fn ensure_deck(
    State(state): State<HttpState>,
    Json(request): Json<EnsureDeckRequest>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::decks::ensure_deck";

    match state.decks.ensure_deck(&request.deckcode_or_shortid).await? {
        Some(deck) => Ok(Json(deck).into_response()),
        None => Err(HttpError::new(
            SOURCE,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid deck code",
            format!(
                "`{}` is neither a known shortid nor a valid deck code",
                request.deckcode_or_shortid
            ),
        )),
    }
}

pub(super) async fn get_deck_image(
    State(state): State<HttpState>,
    Path(deckcode): Path<String>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::decks::get_deck_image";

    match state.decks.get_deck_image(&deckcode).await? {
        Some(image) => Ok(png_response(image)),
        None => Err(image_not_found(SOURCE, &deckcode)),
    }
}

pub(super) async fn render_deck_image(
    State(state): State<HttpState>,
    Path(deckcode): Path<String>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::decks::render_deck_image";

    match state.decks.render_deck_image(&deckcode).await? {
        Some(image) => Ok(png_response(image)),
        None => Err(image_not_found(SOURCE, &deckcode)),
    }
}

fn png_response(image: Bytes) -> Response {
    (
        [(CONTENT_TYPE, "image/png"), (CACHE_CONTROL, "public, max-age=3600")],
        image,
    )
        .into_response()
}

fn deck_not_found(source: &'static str, value: &str) -> HttpError {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Deck not found",
        format!("no deck matches `{value}`"),
    )
}

fn image_not_found(source: &'static str, deckcode: &str) -> HttpError {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Deck image not available",
        format!("no current image for `{deckcode}`"),
    )
}
