use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::application::decks::DeckError;
use crate::application::render::RenderError;
use crate::application::repos::RepoError;
use crate::application::shortid::ShortidError;
use crate::domain::deckcode::DeckcodeError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<DeckError> for HttpError {
    fn from(error: DeckError) -> Self {
        const SOURCE: &str = "application::error::deck_error_to_http_error";

        match error {
            DeckError::Repo(RepoError::NotFound) => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Deck not found",
                "Deck record disappeared during the request",
            ),
            DeckError::Repo(RepoError::Timeout)
            | DeckError::Shortid(ShortidError::Repo(RepoError::Timeout))
            | DeckError::Render(RenderError::Repo(RepoError::Timeout))
            | DeckError::Render(RenderError::Shortid(ShortidError::Repo(RepoError::Timeout))) => {
                HttpError::from_error(
                    SOURCE,
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable",
                    &error,
                )
            }
            DeckError::Shortid(ShortidError::Exhausted { .. })
            | DeckError::Render(RenderError::Shortid(ShortidError::Exhausted { .. })) => {
                HttpError::from_error(
                    SOURCE,
                    StatusCode::SERVICE_UNAVAILABLE,
                    "No short identifier available",
                    &error,
                )
            }
            other => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &other,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Deckcode(#[from] DeckcodeError),
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Deckcode(_)
            | AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Deck(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Infra(InfraError::Database(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::NotFound => "Resource not found",
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Deckcode(_)
            | AppError::Validation(_) => "Request could not be processed",
            AppError::Deck(_) => "Deck operation failed",
            AppError::Infra(InfraError::Database(_)) => "Service temporarily unavailable",
            AppError::Infra(InfraError::Configuration { .. })
            | AppError::Infra(InfraError::RenderClient(_)) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_source_chain() {
        let error = DeckError::Render(RenderError::Repo(RepoError::Persistence(
            "connection reset".into(),
        )));
        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);
        assert_eq!(report.messages[0], "persistence error: connection reset");
    }

    #[test]
    fn deck_errors_map_to_statuses() {
        let missing = HttpError::from(DeckError::Repo(RepoError::NotFound)).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let exhausted = HttpError::from(DeckError::Shortid(ShortidError::Exhausted {
            max_length: 12,
        }))
        .into_response();
        assert_eq!(exhausted.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(exhausted.extensions().get::<ErrorReport>().is_some());

        let broken = HttpError::from(DeckError::Repo(RepoError::Persistence("boom".into())))
            .into_response();
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn render_shortid_failures_are_unavailable() {
        let exhausted = HttpError::from(DeckError::Render(RenderError::Shortid(
            ShortidError::Exhausted { max_length: 12 },
        )))
        .into_response();
        assert_eq!(exhausted.status(), StatusCode::SERVICE_UNAVAILABLE);

        let slow = HttpError::from(DeckError::Render(RenderError::Shortid(ShortidError::Repo(
            RepoError::Timeout,
        ))))
        .into_response();
        assert_eq!(slow.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn database_startup_failure_is_unavailable() {
        let response = AppError::from(InfraError::from(sqlx::Error::PoolTimedOut)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_deckcode_is_unprocessable() {
        let response = AppError::from(DeckcodeError::Empty).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
