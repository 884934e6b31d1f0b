use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::render::{RenderCoordinator, RenderError, RenderPoller};
use crate::application::repos::{DeckUpdate, DecksRepo, RepoError};
use crate::application::shortid::{ShortidAllocator, ShortidError};
use crate::domain::deckcode::DeckcodeParser;
use crate::domain::entities::{DeckRecord, DeckRef};

#[derive(Debug, Clone, Error)]
pub enum DeckError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Shortid(#[from] ShortidError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Public operations over the deck registry.
#[derive(Clone)]
pub struct DeckService {
    repo: Arc<dyn DecksRepo>,
    parser: Arc<dyn DeckcodeParser>,
    allocator: ShortidAllocator,
    coordinator: RenderCoordinator,
    poller: RenderPoller,
}

impl DeckService {
    pub fn new(
        repo: Arc<dyn DecksRepo>,
        parser: Arc<dyn DeckcodeParser>,
        allocator: ShortidAllocator,
        coordinator: RenderCoordinator,
        poller: RenderPoller,
    ) -> Self {
        Self {
            repo,
            parser,
            allocator,
            coordinator,
            poller,
        }
    }

    pub async fn get_deck(&self, deckcode: &str) -> Result<Option<DeckRecord>, DeckError> {
        Ok(self.repo.find_by_code(deckcode).await?)
    }

    pub async fn resolve_deck(&self, value: &str) -> Result<Option<DeckRef>, DeckError> {
        Ok(self.repo.find_by_code_or_shortid(value).await?)
    }

    /// Resolve `value` as a known deckcode or shortid, registering it as a new
    /// deck when it is a valid but unknown deck code.
    ///
    /// Returns `None` for input that is neither known nor a valid deck code.
    /// Deck codes are stored in canonical form, so two spellings of the same
    /// deck share one record.
    pub async fn ensure_deck(&self, value: &str) -> Result<Option<DeckRef>, DeckError> {
        let value = value.trim();
        if let Some(found) = self.repo.find_by_code_or_shortid(value).await? {
            return Ok(Some(found));
        }

        let parsed = match self.parser.parse(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(
                    target = "application::decks::ensure_deck",
                    value = %value,
                    error = %err,
                    "rejecting invalid deck code"
                );
                return Ok(None);
            }
        };

        if parsed.deckcode != value
            && let Some(existing) = self.repo.find_by_code(&parsed.deckcode).await?
        {
            return Ok(Some(existing.to_ref()));
        }

        let record = self
            .allocator
            .upsert_with_fresh_shortid(&parsed.deckcode, false, DeckUpdate::default())
            .await?;

        info!(
            target = "application::decks::ensure_deck",
            deckcode = %record.deckcode,
            shortid = %record.shortid,
            "deck registered"
        );

        Ok(Some(record.to_ref()))
    }

    /// Image for `deckcode` if one is current or finishes rendering within
    /// the poll budget. Never starts a render.
    pub async fn get_deck_image(&self, deckcode: &str) -> Result<Option<Bytes>, DeckError> {
        Ok(self.poller.wait_for_image(deckcode).await?)
    }

    /// Render `deckcode` now and return the image, or `None` if rendering
    /// failed.
    pub async fn render_deck_image(&self, deckcode: &str) -> Result<Option<Bytes>, DeckError> {
        Ok(self.coordinator.render(deckcode).await?)
    }

    pub fn image_version(&self) -> &str {
        self.coordinator.image_version()
    }

    pub async fn health_check(&self) -> Result<(), DeckError> {
        Ok(self.repo.health_check().await?)
    }
}
