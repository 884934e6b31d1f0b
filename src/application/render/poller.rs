use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tracing::debug;

use crate::application::repos::{DecksRepo, RepoError};
use crate::domain::entities::ImageState;

const METRIC_POLL_EXHAUSTED: &str = "deckshelf_image_poll_exhausted_total";

/// Read-only wait for an image some other caller is rendering.
///
/// Never starts a render and never touches the rendering flag. The longest
/// a caller can wait is `max_attempts * interval`.
#[derive(Clone)]
pub struct RenderPoller {
    repo: Arc<dyn DecksRepo>,
    image_version: Arc<str>,
    max_attempts: u32,
    interval: Duration,
}

impl RenderPoller {
    pub fn new(
        repo: Arc<dyn DecksRepo>,
        image_version: impl Into<Arc<str>>,
        max_attempts: u32,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            image_version: image_version.into(),
            max_attempts,
            interval,
        }
    }

    pub async fn wait_for_image(&self, deckcode: &str) -> Result<Option<Bytes>, RepoError> {
        for attempt in 1..=self.max_attempts {
            let Some(record) = self.repo.find_by_code(deckcode).await? else {
                return Ok(None);
            };

            match record.image_state(&self.image_version) {
                ImageState::Ready { image, .. } => return Ok(Some(image)),
                ImageState::NoImage => return Ok(None),
                ImageState::Rendering => {
                    debug!(
                        target = "application::render::poller",
                        deckcode = %deckcode,
                        attempt,
                        "image still rendering"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }

        counter!(METRIC_POLL_EXHAUSTED).increment(1);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use crate::application::repos::{DeckUpdate, NewDeckParams};
    use crate::domain::entities::{DeckRecord, DeckRef};

    struct SingleDeck {
        record: Mutex<Option<DeckRecord>>,
        reads: Mutex<u32>,
    }

    impl SingleDeck {
        fn with(image: Option<&'static [u8]>, version: Option<&str>, rendering: bool) -> Arc<Self> {
            Arc::new(Self {
                record: Mutex::new(Some(DeckRecord {
                    deckcode: "CODE".into(),
                    shortid: "abc".into(),
                    image: image.map(Bytes::from_static),
                    image_version: version.map(str::to_string),
                    image_rendering: rendering,
                    created_at: OffsetDateTime::UNIX_EPOCH,
                    updated_at: OffsetDateTime::UNIX_EPOCH,
                })),
                reads: Mutex::new(0),
            })
        }

        fn reads(&self) -> u32 {
            *self.reads.lock().unwrap()
        }
    }

    #[async_trait]
    impl DecksRepo for SingleDeck {
        async fn find_by_code(&self, _deckcode: &str) -> Result<Option<DeckRecord>, RepoError> {
            *self.reads.lock().unwrap() += 1;
            Ok(self.record.lock().unwrap().clone())
        }

        async fn find_by_code_or_shortid(&self, _value: &str) -> Result<Option<DeckRef>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn upsert_deck(
            &self,
            _deckcode: &str,
            _create: NewDeckParams,
            _update: DeckUpdate,
        ) -> Result<DeckRecord, RepoError> {
            unreachable!("poller never writes")
        }

        async fn update_deck(
            &self,
            _deckcode: &str,
            _update: DeckUpdate,
        ) -> Result<DeckRecord, RepoError> {
            unreachable!("poller never writes")
        }

        async fn existing_shortids(
            &self,
            _candidates: &[String],
        ) -> Result<HashSet<String>, RepoError> {
            unreachable!("not used in these tests")
        }
    }

    fn poller(repo: Arc<SingleDeck>) -> RenderPoller {
        RenderPoller::new(repo, "2.1", 10, Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn stale_image_without_render_is_absent() {
        let repo = SingleDeck::with(Some(b"old"), Some("1.0"), false);
        let started = tokio::time::Instant::now();

        assert_eq!(poller(repo.clone()).wait_for_image("CODE").await.unwrap(), None);
        assert_eq!(repo.reads(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_render_gives_up_after_budget() {
        let repo = SingleDeck::with(None, None, true);
        let started = tokio::time::Instant::now();

        assert_eq!(poller(repo.clone()).wait_for_image("CODE").await.unwrap(), None);
        assert_eq!(repo.reads(), 10);
        // No sleep after the last read.
        assert_eq!(started.elapsed(), Duration::from_millis(9 * 500));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_deck_is_absent() {
        let repo = Arc::new(SingleDeck {
            record: Mutex::new(None),
            reads: Mutex::new(0),
        });
        assert_eq!(poller(repo.clone()).wait_for_image("CODE").await.unwrap(), None);
        assert_eq!(repo.reads(), 1);
    }
}
