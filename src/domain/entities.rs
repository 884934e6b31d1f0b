use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;

/// Persisted deck row. Image fields are only mutated by the render coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckRecord {
    pub deckcode: String,
    pub shortid: String,
    pub image: Option<Bytes>,
    pub image_version: Option<String>,
    pub image_rendering: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl DeckRecord {
    /// Collapse the stored flag/blob/version triple into an explicit state.
    ///
    /// An image tagged with any version other than `expected_version` is
    /// stale and reads as [`ImageState::NoImage`] (or `Rendering`).
    pub fn image_state(&self, expected_version: &str) -> ImageState {
        match (&self.image, self.image_version.as_deref()) {
            (Some(image), Some(version)) if version == expected_version => ImageState::Ready {
                version: version.to_string(),
                image: image.clone(),
            },
            _ if self.image_rendering => ImageState::Rendering,
            _ => ImageState::NoImage,
        }
    }

    pub fn to_ref(&self) -> DeckRef {
        DeckRef {
            shortid: self.shortid.clone(),
            deckcode: self.deckcode.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
    NoImage,
    Rendering,
    Ready { version: String, image: Bytes },
}

/// Public identity pair of a deck.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeckRef {
    pub shortid: String,
    pub deckcode: String,
}

/// Facts derived from a parsed deck code, used to filter view rankings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckInfo {
    pub deckcode: String,
    pub total_count: u32,
    pub factions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckViewCount {
    pub deckcode: String,
    pub view_count: u64,
}
