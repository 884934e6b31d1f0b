//! Repository traits describing persistence adapters.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::entities::{DeckInfo, DeckRecord, DeckRef, DeckViewCount};

#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Whether this is the unique-violation raised when two creations race
    /// for the same short identifier.
    pub fn is_shortid_collision(&self) -> bool {
        matches!(self, RepoError::Duplicate { constraint } if constraint.contains("shortid"))
    }
}

/// Column values used only when the upsert inserts a new deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeckParams {
    pub shortid: String,
    pub image_rendering: bool,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckUpdate {
    pub image: Option<Bytes>,
    pub image_version: Option<String>,
    pub image_rendering: Option<bool>,
}

impl DeckUpdate {
    pub fn rendering_started() -> Self {
        Self {
            image_rendering: Some(true),
            ..Self::default()
        }
    }

    pub fn rendering_finished() -> Self {
        Self {
            image_rendering: Some(false),
            ..Self::default()
        }
    }

    pub fn image_ready(image: Bytes, image_version: impl Into<String>) -> Self {
        Self {
            image: Some(image),
            image_version: Some(image_version.into()),
            image_rendering: Some(false),
        }
    }
}

#[async_trait]
pub trait DecksRepo: Send + Sync {
    async fn find_by_code(&self, deckcode: &str) -> Result<Option<DeckRecord>, RepoError>;

    async fn find_by_code_or_shortid(&self, value: &str) -> Result<Option<DeckRef>, RepoError>;

    /// Insert `deckcode` with `create`, or apply `update` when it already exists.
    async fn upsert_deck(
        &self,
        deckcode: &str,
        create: NewDeckParams,
        update: DeckUpdate,
    ) -> Result<DeckRecord, RepoError>;

    async fn update_deck(&self, deckcode: &str, update: DeckUpdate)
    -> Result<DeckRecord, RepoError>;

    async fn existing_shortids(&self, candidates: &[String])
    -> Result<HashSet<String>, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MostViewedQuery {
    pub count: u32,
    pub since_days_ago: Option<u32>,
    pub factions: Vec<String>,
}

#[async_trait]
pub trait DeckViewsRepo: Send + Sync {
    /// Count one view of `deckcode` from `client_address`, recording
    /// `info` for ranking filters when the code could be parsed.
    async fn increment_view(
        &self,
        deckcode: &str,
        client_address: &str,
        info: Option<&DeckInfo>,
    ) -> Result<(), RepoError>;

    async fn most_viewed(&self, query: &MostViewedQuery) -> Result<Vec<DeckViewCount>, RepoError>;

    async fn view_counts(&self, deckcodes: &[String]) -> Result<HashMap<String, u64>, RepoError>;
}
