use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::{
    application::repos::{DeckUpdate, DecksRepo, NewDeckParams, RepoError},
    domain::entities::{DeckRecord, DeckRef},
};

use super::{PostgresRepositories, map_sqlx_error};

const DECK_COLUMNS: &str =
    "deckcode, shortid, image, image_version, image_rendering, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct DeckRow {
    deckcode: String,
    shortid: String,
    image: Option<Vec<u8>>,
    image_version: Option<String>,
    image_rendering: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<DeckRow> for DeckRecord {
    fn from(row: DeckRow) -> Self {
        Self {
            deckcode: row.deckcode,
            shortid: row.shortid,
            image: row.image.map(Bytes::from),
            image_version: row.image_version,
            image_rendering: row.image_rendering,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeckRefRow {
    shortid: String,
    deckcode: String,
}

#[async_trait]
impl DecksRepo for PostgresRepositories {
    async fn find_by_code(&self, deckcode: &str) -> Result<Option<DeckRecord>, RepoError> {
        let sql = format!("SELECT {DECK_COLUMNS} FROM decks WHERE deckcode = $1");
        let row = sqlx::query_as::<_, DeckRow>(&sql)
            .bind(deckcode)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(DeckRecord::from))
    }

    async fn find_by_code_or_shortid(&self, value: &str) -> Result<Option<DeckRef>, RepoError> {
        let row = sqlx::query_as::<_, DeckRefRow>(
            r#"
            SELECT shortid, deckcode
            FROM decks
            WHERE deckcode = $1 OR shortid = $1
            ORDER BY (deckcode = $1) DESC
            LIMIT 1
            "#,
        )
        .bind(value)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| DeckRef {
            shortid: row.shortid,
            deckcode: row.deckcode,
        }))
    }

    async fn upsert_deck(
        &self,
        deckcode: &str,
        create: NewDeckParams,
        update: DeckUpdate,
    ) -> Result<DeckRecord, RepoError> {
        let sql = format!(
            r#"
            INSERT INTO decks (deckcode, shortid, image_rendering)
            VALUES ($1, $2, $3)
            ON CONFLICT (deckcode) DO UPDATE SET
                image = COALESCE($4, decks.image),
                image_version = COALESCE($5, decks.image_version),
                image_rendering = COALESCE($6, decks.image_rendering),
                updated_at = now()
            RETURNING {DECK_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, DeckRow>(&sql)
            .bind(deckcode)
            .bind(&create.shortid)
            .bind(create.image_rendering)
            .bind(update.image.as_deref())
            .bind(update.image_version.as_deref())
            .bind(update.image_rendering)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_deck(
        &self,
        deckcode: &str,
        update: DeckUpdate,
    ) -> Result<DeckRecord, RepoError> {
        let sql = format!(
            r#"
            UPDATE decks SET
                image = COALESCE($2, image),
                image_version = COALESCE($3, image_version),
                image_rendering = COALESCE($4, image_rendering),
                updated_at = now()
            WHERE deckcode = $1
            RETURNING {DECK_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, DeckRow>(&sql)
            .bind(deckcode)
            .bind(update.image.as_deref())
            .bind(update.image_version.as_deref())
            .bind(update.image_rendering)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(DeckRecord::from).ok_or(RepoError::NotFound)
    }

    async fn existing_shortids(
        &self,
        candidates: &[String],
    ) -> Result<HashSet<String>, RepoError> {
        if candidates.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = sqlx::query_scalar::<_, String>(
            "SELECT shortid FROM decks WHERE shortid = ANY($1)",
        )
        .bind(candidates)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().collect())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        PostgresRepositories::health_check(self)
            .await
            .map_err(map_sqlx_error)
    }
}
