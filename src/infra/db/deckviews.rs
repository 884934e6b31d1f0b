use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::{
    application::repos::{DeckViewsRepo, MostViewedQuery, RepoError},
    domain::entities::{DeckInfo, DeckViewCount},
};

use super::{PostgresRepositories, map_sqlx_error};

/// Only complete decks take part in the ranking.
const RANKED_DECK_SIZE: i32 = 40;

#[derive(sqlx::FromRow)]
struct ViewCountRow {
    deckcode: String,
    view_count: i64,
}

#[async_trait]
impl DeckViewsRepo for PostgresRepositories {
    async fn increment_view(
        &self,
        deckcode: &str,
        client_address: &str,
        info: Option<&DeckInfo>,
    ) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO deckviews (deckcode, ip_address)
            VALUES ($1, $2)
            ON CONFLICT (deckcode, ip_address) DO UPDATE SET
                view_count = deckviews.view_count + 1,
                updated_at = now()
            "#,
        )
        .bind(deckcode)
        .bind(client_address)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if let Some(info) = info {
            let total_count = i32::try_from(info.total_count).unwrap_or(i32::MAX);
            sqlx::query(
                r#"
                INSERT INTO deck_info (deckcode, total_count, factions)
                VALUES ($1, $2, $3)
                ON CONFLICT (deckcode) DO UPDATE SET
                    total_count = EXCLUDED.total_count,
                    factions = EXCLUDED.factions
                "#,
            )
            .bind(&info.deckcode)
            .bind(total_count)
            .bind(&info.factions)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn most_viewed(&self, query: &MostViewedQuery) -> Result<Vec<DeckViewCount>, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            r#"
            SELECT v.deckcode, COUNT(*) AS view_count
            FROM deckviews v
            INNER JOIN deck_info i ON i.deckcode = v.deckcode
            WHERE i.total_count = "#,
        );
        qb.push_bind(RANKED_DECK_SIZE);

        if !query.factions.is_empty() {
            qb.push(" AND i.factions && ");
            qb.push_bind(query.factions.clone());
        }

        if let Some(days) = query.since_days_ago {
            qb.push(" AND v.updated_at >= now() - make_interval(days => ");
            qb.push_bind(i32::try_from(days).unwrap_or(i32::MAX));
            qb.push(")");
        }

        qb.push(" GROUP BY v.deckcode ORDER BY view_count DESC, v.deckcode LIMIT ");
        qb.push_bind(i64::from(query.count));

        let rows = qb
            .build_query_as::<ViewCountRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(DeckViewCount {
                    deckcode: row.deckcode,
                    view_count: Self::convert_count(row.view_count)?,
                })
            })
            .collect()
    }

    async fn view_counts(&self, deckcodes: &[String]) -> Result<HashMap<String, u64>, RepoError> {
        let rows = sqlx::query_as::<_, ViewCountRow>(
            r#"
            SELECT deckcode, COUNT(*) AS view_count
            FROM deckviews
            WHERE deckcode = ANY($1)
            GROUP BY deckcode
            "#,
        )
        .bind(deckcodes)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| Ok((row.deckcode, Self::convert_count(row.view_count)?)))
            .collect()
    }
}
