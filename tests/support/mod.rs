#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use deckshelf::application::decks::DeckService;
use deckshelf::application::render::{
    RenderBackend, RenderBackendError, RenderCoordinator, RenderJob, RenderPoller,
};
use deckshelf::application::repos::{
    DeckUpdate, DeckViewsRepo, DecksRepo, MostViewedQuery, NewDeckParams, RepoError,
};
use deckshelf::application::shortid::ShortidAllocator;
use deckshelf::application::views::DeckViewService;
use deckshelf::domain::deckcode::{
    Card, CardEntry, DeckcodeParser, Faction, RuneterraDeckcodes, encode_deck,
};
use deckshelf::domain::entities::{DeckInfo, DeckRecord, DeckRef, DeckViewCount};
use deckshelf::domain::shortid::ShortidPolicy;

pub const IMAGE_VERSION: &str = "2.0";
pub const POLL_ATTEMPTS: u32 = 10;
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A valid 40 card Demacia/Ionia deck; `seed` varies the card numbers.
pub fn deckcode(seed: u64) -> String {
    let entries: Vec<CardEntry> = (0..14)
        .map(|index| CardEntry {
            card: Card::new(
                1,
                if index % 2 == 0 {
                    Faction::Demacia
                } else {
                    Faction::Ionia
                },
                seed * 100 + index + 1,
            ),
            count: if index < 12 { 3 } else { 2 },
        })
        .collect();
    encode_deck(&entries)
}

/// Decks kept in memory with the same uniqueness rules as the database.
#[derive(Default)]
pub struct InMemoryDecks {
    decks: Mutex<HashMap<String, DeckRecord>>,
    reads: AtomicUsize,
}

impl InMemoryDecks {
    pub fn insert(&self, record: DeckRecord) {
        self.decks
            .lock()
            .unwrap()
            .insert(record.deckcode.clone(), record);
    }

    pub fn get(&self, deckcode: &str) -> Option<DeckRecord> {
        self.decks.lock().unwrap().get(deckcode).cloned()
    }

    pub fn len(&self) -> usize {
        self.decks.lock().unwrap().len()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

pub fn record(deckcode: &str, shortid: &str) -> DeckRecord {
    DeckRecord {
        deckcode: deckcode.to_string(),
        shortid: shortid.to_string(),
        image: None,
        image_version: None,
        image_rendering: false,
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

fn apply(record: &mut DeckRecord, update: DeckUpdate) {
    if let Some(image) = update.image {
        record.image = Some(image);
    }
    if let Some(version) = update.image_version {
        record.image_version = Some(version);
    }
    if let Some(rendering) = update.image_rendering {
        record.image_rendering = rendering;
    }
    record.updated_at = OffsetDateTime::now_utc();
}

#[async_trait]
impl DecksRepo for InMemoryDecks {
    async fn find_by_code(&self, deckcode: &str) -> Result<Option<DeckRecord>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(deckcode))
    }

    async fn find_by_code_or_shortid(&self, value: &str) -> Result<Option<DeckRef>, RepoError> {
        let decks = self.decks.lock().unwrap();
        Ok(decks
            .values()
            .find(|deck| deck.deckcode == value || deck.shortid == value)
            .map(DeckRecord::to_ref))
    }

    async fn upsert_deck(
        &self,
        deckcode: &str,
        create: NewDeckParams,
        update: DeckUpdate,
    ) -> Result<DeckRecord, RepoError> {
        let mut decks = self.decks.lock().unwrap();
        if let Some(existing) = decks.get_mut(deckcode) {
            apply(existing, update);
            return Ok(existing.clone());
        }

        if decks.values().any(|deck| deck.shortid == create.shortid) {
            return Err(RepoError::Duplicate {
                constraint: "decks_shortid_key".into(),
            });
        }

        let now = OffsetDateTime::now_utc();
        let created = DeckRecord {
            deckcode: deckcode.to_string(),
            shortid: create.shortid,
            image: None,
            image_version: None,
            image_rendering: create.image_rendering,
            created_at: now,
            updated_at: now,
        };
        decks.insert(deckcode.to_string(), created.clone());
        Ok(created)
    }

    async fn update_deck(
        &self,
        deckcode: &str,
        update: DeckUpdate,
    ) -> Result<DeckRecord, RepoError> {
        let mut decks = self.decks.lock().unwrap();
        let deck = decks.get_mut(deckcode).ok_or(RepoError::NotFound)?;
        apply(deck, update);
        Ok(deck.clone())
    }

    async fn existing_shortids(
        &self,
        candidates: &[String],
    ) -> Result<HashSet<String>, RepoError> {
        let decks = self.decks.lock().unwrap();
        Ok(decks
            .values()
            .filter(|deck| candidates.contains(&deck.shortid))
            .map(|deck| deck.shortid.clone())
            .collect())
    }
}

/// Distinct viewers per deck plus the parsed deck facts.
#[derive(Default)]
pub struct InMemoryViews {
    viewers: Mutex<HashMap<String, HashSet<String>>>,
    info: Mutex<HashMap<String, DeckInfo>>,
}

#[async_trait]
impl DeckViewsRepo for InMemoryViews {
    async fn increment_view(
        &self,
        deckcode: &str,
        client_address: &str,
        info: Option<&DeckInfo>,
    ) -> Result<(), RepoError> {
        self.viewers
            .lock()
            .unwrap()
            .entry(deckcode.to_string())
            .or_default()
            .insert(client_address.to_string());
        if let Some(info) = info {
            self.info
                .lock()
                .unwrap()
                .insert(deckcode.to_string(), info.clone());
        }
        Ok(())
    }

    async fn most_viewed(&self, query: &MostViewedQuery) -> Result<Vec<DeckViewCount>, RepoError> {
        let viewers = self.viewers.lock().unwrap();
        let info = self.info.lock().unwrap();

        let mut ranked: Vec<DeckViewCount> = viewers
            .iter()
            .filter_map(|(deckcode, clients)| {
                let facts = info.get(deckcode)?;
                let overlaps = query.factions.is_empty()
                    || facts.factions.iter().any(|f| query.factions.contains(f));
                (facts.total_count == 40 && overlaps).then(|| DeckViewCount {
                    deckcode: deckcode.clone(),
                    view_count: clients.len() as u64,
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.view_count
                .cmp(&a.view_count)
                .then_with(|| a.deckcode.cmp(&b.deckcode))
        });
        ranked.truncate(query.count as usize);
        Ok(ranked)
    }

    async fn view_counts(&self, deckcodes: &[String]) -> Result<HashMap<String, u64>, RepoError> {
        let viewers = self.viewers.lock().unwrap();
        Ok(deckcodes
            .iter()
            .filter_map(|code| {
                viewers
                    .get(code)
                    .map(|clients| (code.clone(), clients.len() as u64))
            })
            .collect())
    }
}

pub enum Script {
    Succeed(&'static [u8]),
    Fail(u16),
    Panic,
}

/// Backend that answers every job the same way after `delay`.
pub struct ScriptedBackend {
    name: &'static str,
    delay: Duration,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(name: &'static str, delay: Duration, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            delay,
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderBackend for ScriptedBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn render(&self, _job: &RenderJob) -> Result<Bytes, RenderBackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.script {
            Script::Succeed(image) => Ok(Bytes::from_static(image)),
            Script::Fail(status) => Err(RenderBackendError::Status {
                backend: self.name.to_string(),
                status,
            }),
            Script::Panic => panic!("{} blew up", self.name),
        }
    }
}

pub struct Harness {
    pub decks_repo: Arc<InMemoryDecks>,
    pub views_repo: Arc<InMemoryViews>,
    pub coordinator: RenderCoordinator,
    pub poller: RenderPoller,
    pub decks: Arc<DeckService>,
    pub views: Arc<DeckViewService>,
}

pub fn harness(backends: Vec<Arc<dyn RenderBackend>>) -> Harness {
    let decks_repo = Arc::new(InMemoryDecks::default());
    let views_repo = Arc::new(InMemoryViews::default());
    let repo: Arc<dyn DecksRepo> = decks_repo.clone();
    let parser: Arc<dyn DeckcodeParser> = Arc::new(RuneterraDeckcodes);

    let allocator = ShortidAllocator::new(repo.clone(), ShortidPolicy::default());
    let coordinator =
        RenderCoordinator::new(repo.clone(), allocator.clone(), backends, IMAGE_VERSION);
    let poller = RenderPoller::new(repo.clone(), IMAGE_VERSION, POLL_ATTEMPTS, POLL_INTERVAL);

    let decks = Arc::new(DeckService::new(
        repo,
        parser.clone(),
        allocator,
        coordinator.clone(),
        poller.clone(),
    ));
    let views = Arc::new(DeckViewService::new(views_repo.clone(), parser));

    Harness {
        decks_repo,
        views_repo,
        coordinator,
        poller,
        decks,
        views,
    }
}
