use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::entities::{DeckRecord, DeckViewCount, ImageState};

pub const DEFAULT_MOST_VIEWED: u32 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureDeckRequest {
    pub deckcode_or_shortid: String,
}

/// Deck record as exposed over HTTP; image bytes are served separately.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckResponse {
    pub deckcode: String,
    pub shortid: String,
    pub image_version: Option<String>,
    pub image_rendering: bool,
    pub image_ready: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl DeckResponse {
    pub fn from_record(record: DeckRecord, expected_version: &str) -> Self {
        let image_ready = matches!(
            record.image_state(expected_version),
            ImageState::Ready { .. }
        );
        Self {
            deckcode: record.deckcode,
            shortid: record.shortid,
            image_version: record.image_version,
            image_rendering: record.image_rendering,
            image_ready,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MostViewedParams {
    pub count: Option<u32>,
    pub since_days_ago: Option<i64>,
    pub factions: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ViewCountsParams {
    pub deckcodes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCountResponse {
    pub deckcode: String,
    pub view_count: u64,
}

impl From<DeckViewCount> for ViewCountResponse {
    fn from(value: DeckViewCount) -> Self {
        Self {
            deckcode: value.deckcode,
            view_count: value.view_count,
        }
    }
}

/// Split a comma separated query value, dropping empty items.
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_ignores_blanks() {
        assert_eq!(split_list(Some("IO, ,DE,")), vec!["IO", "DE"]);
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn deck_response_uses_camel_case() {
        let record = DeckRecord {
            deckcode: "CODE".into(),
            shortid: "x7K".into(),
            image: Some(bytes::Bytes::from_static(b"png")),
            image_version: Some("2.1".into()),
            image_rendering: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_value(DeckResponse::from_record(record, "2.1")).unwrap();
        assert_eq!(json["shortid"], "x7K");
        assert_eq!(json["imageVersion"], "2.1");
        assert_eq!(json["imageReady"], true);
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
    }
}
