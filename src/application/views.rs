use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::application::repos::{DeckViewsRepo, MostViewedQuery, RepoError};
use crate::domain::deckcode::DeckcodeParser;
use crate::domain::entities::{DeckInfo, DeckViewCount};

pub const MAX_MOST_VIEWED: u32 = 100;

/// Thin layer over the view counters.
#[derive(Clone)]
pub struct DeckViewService {
    repo: Arc<dyn DeckViewsRepo>,
    parser: Arc<dyn DeckcodeParser>,
}

impl DeckViewService {
    pub fn new(repo: Arc<dyn DeckViewsRepo>, parser: Arc<dyn DeckcodeParser>) -> Self {
        Self { repo, parser }
    }

    pub async fn increment_view(
        &self,
        deckcode: &str,
        client_address: &str,
    ) -> Result<(), RepoError> {
        let info = match self.parser.parse(deckcode) {
            Ok(parsed) => Some(DeckInfo {
                deckcode: deckcode.to_string(),
                total_count: u32::try_from(parsed.total_count).unwrap_or(u32::MAX),
                factions: parsed.faction_codes(),
            }),
            Err(err) => {
                debug!(
                    target = "application::views::increment_view",
                    deckcode = %deckcode,
                    error = %err,
                    "view recorded without deck info"
                );
                None
            }
        };

        self.repo
            .increment_view(deckcode, client_address, info.as_ref())
            .await
    }

    pub async fn most_viewed(
        &self,
        count: u32,
        since_days_ago: Option<i64>,
        factions: &[String],
    ) -> Result<Vec<DeckViewCount>, RepoError> {
        let query = MostViewedQuery {
            count: count.clamp(1, MAX_MOST_VIEWED),
            since_days_ago: since_days_ago
                .filter(|days| *days != 0)
                .map(|days| u32::try_from(days.unsigned_abs()).unwrap_or(u32::MAX)),
            factions: normalize_factions(factions),
        };

        self.repo.most_viewed(&query).await
    }

    pub async fn view_counts(&self, deckcodes: &[String]) -> Result<HashMap<String, u64>, RepoError> {
        let unique: BTreeSet<&str> = deckcodes
            .iter()
            .map(|code| code.trim())
            .filter(|code| !code.is_empty())
            .collect();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let unique: Vec<String> = unique.into_iter().map(str::to_string).collect();
        let mut counts = self.repo.view_counts(&unique).await?;
        for deckcode in unique {
            counts.entry(deckcode).or_insert(0);
        }
        Ok(counts)
    }
}

fn normalize_factions(factions: &[String]) -> Vec<String> {
    let set: BTreeSet<String> = factions
        .iter()
        .map(|faction| faction.trim().to_ascii_uppercase())
        .filter(|faction| !faction.is_empty())
        .collect();
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::deckcode::RuneterraDeckcodes;

    #[derive(Default)]
    struct RecordingViews {
        increments: Mutex<Vec<(String, String, Option<DeckInfo>)>>,
        queries: Mutex<Vec<MostViewedQuery>>,
        count_calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl DeckViewsRepo for RecordingViews {
        async fn increment_view(
            &self,
            deckcode: &str,
            client_address: &str,
            info: Option<&DeckInfo>,
        ) -> Result<(), RepoError> {
            self.increments.lock().unwrap().push((
                deckcode.to_string(),
                client_address.to_string(),
                info.cloned(),
            ));
            Ok(())
        }

        async fn most_viewed(
            &self,
            query: &MostViewedQuery,
        ) -> Result<Vec<DeckViewCount>, RepoError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(Vec::new())
        }

        async fn view_counts(
            &self,
            deckcodes: &[String],
        ) -> Result<HashMap<String, u64>, RepoError> {
            self.count_calls.lock().unwrap().push(deckcodes.to_vec());
            Ok(deckcodes.iter().map(|code| (code.clone(), 1)).collect())
        }
    }

    fn service() -> (DeckViewService, Arc<RecordingViews>) {
        let repo = Arc::new(RecordingViews::default());
        (
            DeckViewService::new(repo.clone(), Arc::new(RuneterraDeckcodes)),
            repo,
        )
    }

    #[tokio::test]
    async fn parsed_views_carry_deck_info() {
        let (service, repo) = service();
        service
            .increment_view("CEAQCAIAAEAAA", "10.0.0.1")
            .await
            .unwrap();
        service.increment_view("not-a-deck", "10.0.0.1").await.unwrap();

        let increments = repo.increments.lock().unwrap();
        let info = increments[0].2.as_ref().expect("info for valid code");
        assert_eq!(info.total_count, 3);
        assert_eq!(info.factions, vec!["DE".to_string()]);
        assert!(increments[1].2.is_none());
    }

    #[tokio::test]
    async fn most_viewed_clamps_and_normalizes() {
        let (service, repo) = service();
        service
            .most_viewed(500, Some(-7), &["io".into(), " ".into(), "IO".into(), "de".into()])
            .await
            .unwrap();
        service.most_viewed(0, None, &[]).await.unwrap();
        service.most_viewed(10, Some(0), &[]).await.unwrap();

        let queries = repo.queries.lock().unwrap();
        assert_eq!(
            queries[0],
            MostViewedQuery {
                count: 100,
                since_days_ago: Some(7),
                factions: vec!["DE".into(), "IO".into()],
            }
        );
        assert_eq!(queries[1].count, 1);
        assert!(queries[1].factions.is_empty());
        assert_eq!(queries[2].since_days_ago, None);
    }

    #[tokio::test]
    async fn view_counts_skips_store_for_empty_input() {
        let (service, repo) = service();
        assert!(service.view_counts(&[" ".into()]).await.unwrap().is_empty());
        assert!(repo.count_calls.lock().unwrap().is_empty());

        let counts = service
            .view_counts(&["B".into(), "A".into(), "B".into()])
            .await
            .unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(
            repo.count_calls.lock().unwrap()[0],
            vec!["A".to_string(), "B".to_string()]
        );
    }
}
