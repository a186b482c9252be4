use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};
use url::Url;

use super::core::{Database, DbLockErrorExt};
use crate::domain::{Article, BiasRating, Factuality};
use crate::vector::EMBEDDING_DIM;
use crate::TARGET_DB;

const ARTICLE_COLUMNS: &str = "id, source_id, source_name, bias_rating, factuality, headline, \
     summary, url, image_url, pub_date, fetched_at, cluster_id, embedding, entities";

impl Database {
    /// Insert or refresh a batch of ingested articles in one transaction.
    ///
    /// Re-fetches of a known URL update `fetched_at` and `headline` but never
    /// replace a stored `image_url` with null. Retries the whole transaction
    /// on SQLite lock contention with exponential backoff.
    pub async fn upsert_articles(&self, articles: &[Article]) -> Result<u64, sqlx::Error> {
        if articles.is_empty() {
            return Ok(0);
        }

        let mut backoff = 100; // initial delay in milliseconds
        let max_retries = 5;

        for attempt in 1..=max_retries {
            match self.try_upsert_articles(articles).await {
                Ok(count) => {
                    debug!(target: TARGET_DB, "Upserted {} articles", count);
                    return Ok(count);
                }
                Err(err) if err.is_database_lock_error() && attempt < max_retries => {
                    let jitter = rand::rng().random_range(0..100);
                    info!(
                        target: TARGET_DB,
                        "Database is locked, waiting {}ms before retrying attempt {}/{}",
                        backoff + jitter, attempt, max_retries
                    );
                    sleep(Duration::from_millis(backoff + jitter)).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => {
                    error!(target: TARGET_DB, "Failed to upsert articles: {}", err);
                    return Err(err);
                }
            }
        }

        Err(sqlx::Error::Protocol(
            "Maximum retries exceeded for article upsert".into(),
        ))
    }

    async fn try_upsert_articles(&self, articles: &[Article]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        let mut count = 0u64;

        for article in articles {
            if Url::parse(&article.url).is_err() {
                error!(target: TARGET_DB, "Skipping article with invalid URL: {}", article.url);
                continue;
            }

            // The id is derived from the url, so an id conflict IS the url
            // conflict and the merge rules below apply to re-fetches.
            let id = if article.id.is_empty() {
                Article::id_for_url(&article.url)
            } else {
                article.id.clone()
            };

            sqlx::query(
                r#"
                INSERT INTO news_articles
                (id, source_id, source_name, bias_rating, factuality, headline, summary,
                 url, image_url, pub_date, fetched_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO UPDATE SET
                    headline = excluded.headline,
                    summary = excluded.summary,
                    fetched_at = excluded.fetched_at,
                    image_url = COALESCE(excluded.image_url, news_articles.image_url)
                "#,
            )
            .bind(&id)
            .bind(&article.source_id)
            .bind(&article.source_name)
            .bind(article.bias_rating.as_str())
            .bind(article.factuality.as_str())
            .bind(&article.headline)
            .bind(&article.summary)
            .bind(&article.url)
            .bind(&article.image_url)
            .bind(article.pub_date.to_rfc3339())
            .bind(article.fetched_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            count += 1;
        }

        tx.commit().await?;
        Ok(count)
    }

    /// Articles awaiting clustering, oldest first so earlier events anchor
    /// clusters downstream.
    pub async fn select_unclustered(
        &self,
        max_age_hours: i64,
        limit: i64,
    ) -> Result<Vec<Article>, sqlx::Error> {
        let cutoff = (Utc::now() - ChronoDuration::hours(max_age_hours)).to_rfc3339();

        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM news_articles \
             WHERE cluster_id IS NULL AND pub_date > ?1 \
             ORDER BY pub_date ASC LIMIT ?2"
        ))
        .bind(&cutoff)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(article_from_row).collect()
    }

    /// Write embeddings and entity lists for a batch of articles in one
    /// transaction.
    pub async fn persist_enrichment(&self, articles: &[Article]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        for article in articles {
            let embedding_json = article
                .embedding
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            let entities_json = article
                .entities
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

            sqlx::query(
                "UPDATE news_articles SET embedding = ?1, entities = ?2 WHERE id = ?3",
            )
            .bind(embedding_json)
            .bind(entities_json)
            .bind(&article.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(target: TARGET_DB, "Persisted enrichment for {} articles", articles.len());
        Ok(())
    }

    /// Member articles of a cluster, newest publication first, embeddings
    /// included.
    pub async fn load_cluster_articles(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<Article>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM news_articles \
             WHERE cluster_id = ?1 ORDER BY pub_date DESC"
        ))
        .bind(cluster_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(article_from_row).collect()
    }
}

/// Translate a SQL row into the canonical article record. The only place a
/// `news_articles` row is decoded.
pub(super) fn article_from_row(row: &SqliteRow) -> Result<Article, sqlx::Error> {
    let bias_raw: String = row.get("bias_rating");
    let bias_rating = BiasRating::parse(&bias_raw)
        .ok_or_else(|| decode_error(format!("unknown bias rating '{}'", bias_raw)))?;

    let factuality_raw: String = row.get("factuality");
    let factuality = Factuality::parse(&factuality_raw)
        .ok_or_else(|| decode_error(format!("unknown factuality '{}'", factuality_raw)))?;

    // A stored vector of the wrong dimension (or an unparseable blob) is
    // treated as missing rather than failing the read.
    let embedding = row
        .get::<Option<String>, _>("embedding")
        .and_then(|raw| serde_json::from_str::<Vec<f32>>(&raw).ok())
        .filter(|v| v.len() == EMBEDDING_DIM);

    let entities = row
        .get::<Option<String>, _>("entities")
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok());

    Ok(Article {
        id: row.get("id"),
        source_id: row.get("source_id"),
        source_name: row.get("source_name"),
        bias_rating,
        factuality,
        headline: row.get("headline"),
        summary: row.get("summary"),
        url: row.get("url"),
        image_url: row.get("image_url"),
        pub_date: parse_datetime(&row.get::<String, _>("pub_date"))?,
        fetched_at: parse_datetime(&row.get::<String, _>("fetched_at"))?,
        cluster_id: row.get("cluster_id"),
        embedding,
        entities,
    })
}

pub(super) fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}
