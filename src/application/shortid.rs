use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::repos::{DeckUpdate, DecksRepo, NewDeckParams, RepoError};
use crate::domain::entities::DeckRecord;
use crate::domain::shortid::{ShortidPolicy, first_available, generate_candidates};

const METRIC_SHORTID_WIDEN: &str = "deckshelf_shortid_widen_total";
const MAX_CREATE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Error)]
pub enum ShortidError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("no free shortid found up to length {max_length}")]
    Exhausted { max_length: usize },
}

/// Optimistic shortid allocation.
///
/// Each round draws a batch of candidates at the current length and asks the
/// store which of them are taken; a fully colliding batch widens the length
/// by one. Nothing is reserved, so the store's unique constraint still has
/// the final word when the id is written.
#[derive(Clone)]
pub struct ShortidAllocator {
    repo: Arc<dyn DecksRepo>,
    policy: ShortidPolicy,
}

impl ShortidAllocator {
    pub fn new(repo: Arc<dyn DecksRepo>, policy: ShortidPolicy) -> Self {
        Self { repo, policy }
    }

    pub async fn allocate(&self) -> Result<String, ShortidError> {
        let mut length = self.policy.initial_length;

        while length <= self.policy.max_length {
            // ThreadRng is not Send; keep it out of the await below.
            let candidates =
                generate_candidates(&mut rand::rng(), self.policy.batch_size, length);
            let taken = self.repo.existing_shortids(&candidates).await?;

            if let Some(shortid) = first_available(&candidates, &taken) {
                debug!(
                    target = "application::shortid::allocate",
                    shortid = %shortid,
                    length,
                    "allocated shortid"
                );
                return Ok(shortid);
            }

            counter!(METRIC_SHORTID_WIDEN).increment(1);
            warn!(
                target = "application::shortid::allocate",
                length,
                batch = candidates.len(),
                "every shortid candidate collided; widening"
            );
            length += 1;
        }

        Err(ShortidError::Exhausted {
            max_length: self.policy.max_length,
        })
    }

    /// Upsert `deckcode`, creating it under a freshly allocated shortid if
    /// it does not exist yet.
    ///
    /// Losing the insert race for the same shortid is retried with a new
    /// allocation; any other store failure is returned as is.
    pub async fn upsert_with_fresh_shortid(
        &self,
        deckcode: &str,
        image_rendering: bool,
        update: DeckUpdate,
    ) -> Result<DeckRecord, ShortidError> {
        let mut attempt = 1;
        loop {
            let create = NewDeckParams {
                shortid: self.allocate().await?,
                image_rendering,
            };

            match self.repo.upsert_deck(deckcode, create, update.clone()).await {
                Ok(record) => return Ok(record),
                Err(err) if err.is_shortid_collision() && attempt < MAX_CREATE_ATTEMPTS => {
                    warn!(
                        target = "application::shortid::upsert_with_fresh_shortid",
                        deckcode = %deckcode,
                        attempt,
                        "shortid taken concurrently; allocating again"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
