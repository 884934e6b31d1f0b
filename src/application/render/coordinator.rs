use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::FutureExt;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{error, info, warn};

use super::backend::{RaceError, RenderBackend, RenderJob, race_backends};
use super::flight::{InFlightRenders, RenderGuard, SharedRender};
use crate::application::repos::{DeckUpdate, DecksRepo, RepoError};
use crate::application::shortid::{ShortidAllocator, ShortidError};
use crate::domain::entities::DeckRef;

const METRIC_RENDER_TOTAL: &str = "deckshelf_render_total";
const METRIC_RENDER_MS: &str = "deckshelf_render_ms";

/// Store failures that escape a render. Backend failures never do: they end
/// in the recovery write and an absent image.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Shortid(#[from] ShortidError),
    #[error("render task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
enum AttemptFailure {
    #[error(transparent)]
    Backends(#[from] RaceError),
    #[error("storing rendered image failed: {0}")]
    Persist(#[source] RepoError),
}

/// Drives a deck's image through `Rendering` to `Ready`, or back to a state
/// where another render can be attempted.
#[derive(Clone)]
pub struct RenderCoordinator {
    repo: Arc<dyn DecksRepo>,
    allocator: ShortidAllocator,
    backends: Arc<Vec<Arc<dyn RenderBackend>>>,
    image_version: Arc<str>,
    in_flight: InFlightRenders,
}

impl RenderCoordinator {
    pub fn new(
        repo: Arc<dyn DecksRepo>,
        allocator: ShortidAllocator,
        backends: Vec<Arc<dyn RenderBackend>>,
        image_version: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            repo,
            allocator,
            backends: Arc::new(backends),
            image_version: image_version.into(),
            in_flight: InFlightRenders::new(),
        }
    }

    pub fn image_version(&self) -> &str {
        &self.image_version
    }

    /// Render `deckcode` and return the image, or `None` when every backend
    /// failed.
    ///
    /// Concurrent calls for the same deck inside this process share one
    /// render. The work runs on its own task, so the final state write still
    /// happens if the caller goes away.
    pub async fn render(&self, deckcode: &str) -> Result<Option<Bytes>, RenderError> {
        let (render, started) = self
            .in_flight
            .join_or_start(deckcode, |guard| self.spawn_render(deckcode, guard));

        if !started {
            info!(
                target = "application::render::coordinator",
                deckcode = %deckcode,
                "joining in-flight render"
            );
        }

        render.await
    }

    fn spawn_render(&self, deckcode: &str, guard: RenderGuard) -> SharedRender {
        let coordinator = self.clone();
        let deckcode = deckcode.to_string();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            coordinator.run(&deckcode).await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(RenderError::Aborted(join_err.to_string())),
            }
        }
        .boxed()
        .shared()
    }

    /// Mark the deck as rendering, creating it when unknown.
    pub async fn ensure_render_started(&self, deckcode: &str) -> Result<DeckRef, RenderError> {
        let record = match self.repo.find_by_code(deckcode).await? {
            Some(_) => {
                self.repo
                    .update_deck(deckcode, DeckUpdate::rendering_started())
                    .await?
            }
            None => {
                self.allocator
                    .upsert_with_fresh_shortid(deckcode, true, DeckUpdate::rendering_started())
                    .await?
            }
        };

        Ok(record.to_ref())
    }

    async fn run(&self, deckcode: &str) -> Result<Option<Bytes>, RenderError> {
        let started_at = Instant::now();
        let deck = self.ensure_render_started(deckcode).await?;
        let job = RenderJob {
            deckcode: deck.deckcode,
            shortid: deck.shortid,
        };

        let outcome = self.attempt(&job).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!(METRIC_RENDER_MS).record(elapsed_ms as f64);

        match outcome {
            Ok((backend, image)) => {
                counter!(METRIC_RENDER_TOTAL, "result" => "success").increment(1);
                info!(
                    target = "application::render::coordinator",
                    deckcode = %job.deckcode,
                    shortid = %job.shortid,
                    backend = %backend,
                    bytes = image.len(),
                    elapsed_ms,
                    "deck image rendered"
                );
                Ok(Some(image))
            }
            Err(failure) => {
                counter!(METRIC_RENDER_TOTAL, "result" => "failure").increment(1);
                warn!(
                    target = "application::render::coordinator",
                    deckcode = %job.deckcode,
                    error = %failure,
                    elapsed_ms,
                    "deck render failed; clearing rendering flag"
                );

                if let Err(err) = self
                    .repo
                    .update_deck(&job.deckcode, DeckUpdate::rendering_finished())
                    .await
                {
                    error!(
                        target = "application::render::coordinator",
                        deckcode = %job.deckcode,
                        error = %err,
                        "failed to clear rendering flag"
                    );
                    return Err(err.into());
                }

                Ok(None)
            }
        }
    }

    async fn attempt(&self, job: &RenderJob) -> Result<(String, Bytes), AttemptFailure> {
        let winner = race_backends(&self.backends, job).await?;

        self.repo
            .update_deck(
                &job.deckcode,
                DeckUpdate::image_ready(winner.image.clone(), self.image_version.as_ref()),
            )
            .await
            .map_err(AttemptFailure::Persist)?;

        Ok((winner.backend, winner.image))
    }
}
