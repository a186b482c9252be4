use chrono::{Duration as ChronoDuration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

use super::article::{article_from_row, parse_datetime};
use super::core::Database;
use crate::domain::{Category, Cluster, ClusterStats};
use crate::TARGET_DB;

impl Database {
    /// Insert a batch of clusters and assign their member articles in one
    /// transaction. Either every cluster and every assignment lands, or none
    /// do.
    pub async fn commit_clusters(
        &self,
        clusters: &[Cluster],
        assignment: &[(String, String)],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        for cluster in clusters {
            insert_cluster(&mut tx, cluster).await?;
        }

        for (article_id, cluster_id) in assignment {
            sqlx::query("UPDATE news_articles SET cluster_id = ?1 WHERE id = ?2")
                .bind(cluster_id)
                .bind(article_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(
            target: TARGET_DB,
            "Committed {} clusters covering {} articles",
            clusters.len(),
            assignment.len()
        );
        Ok(())
    }

    /// Clusters created inside the trailing window, newest first. A negative
    /// `limit` returns the whole window.
    pub async fn load_recent_clusters(
        &self,
        max_age_hours: i64,
        limit: i64,
    ) -> Result<Vec<Cluster>, sqlx::Error> {
        let cutoff = (Utc::now() - ChronoDuration::hours(max_age_hours)).to_rfc3339();

        let rows = sqlx::query(
            "SELECT id, headline, summary, category, main_image_url, created_at, stats \
             FROM news_clusters WHERE created_at > ?1 \
             ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(&cutoff)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(cluster_from_row).collect()
    }

    /// Replace a cluster with its refined sub-clusters in one transaction.
    ///
    /// Verifies the old cluster still exists first; a concurrent run may have
    /// already replaced it, in which case the split is abandoned and `false`
    /// returned. On any error the old cluster survives unchanged.
    pub async fn split_cluster(
        &self,
        old_id: &str,
        replacements: &[Cluster],
        assignment: &[(String, String)],
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let exists = sqlx::query("SELECT 1 FROM news_clusters WHERE id = ?1")
            .bind(old_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            debug!(target: TARGET_DB, "Cluster {} vanished before split; skipping", old_id);
            return Ok(false);
        }

        for cluster in replacements {
            insert_cluster(&mut tx, cluster).await?;
        }

        // Reassign members before the delete so no article ever references a
        // missing cluster, even mid-transaction.
        for (article_id, cluster_id) in assignment {
            sqlx::query("UPDATE news_articles SET cluster_id = ?1 WHERE id = ?2")
                .bind(cluster_id)
                .bind(article_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM news_clusters WHERE id = ?1")
            .bind(old_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            target: TARGET_DB,
            "Split cluster {} into {} replacements", old_id, replacements.len()
        );
        Ok(true)
    }
}

async fn insert_cluster(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    cluster: &Cluster,
) -> Result<(), sqlx::Error> {
    let stats_json = serde_json::to_string(&cluster.stats)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO news_clusters
        (id, headline, summary, category, main_image_url, created_at, stats)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&cluster.id)
    .bind(&cluster.headline)
    .bind(&cluster.summary)
    .bind(cluster.category.as_str())
    .bind(&cluster.main_image_url)
    .bind(cluster.created_at.to_rfc3339())
    .bind(&stats_json)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Translate a SQL row into the canonical cluster record.
fn cluster_from_row(row: &SqliteRow) -> Result<Cluster, sqlx::Error> {
    let category_raw: String = row.get("category");
    let category = Category::parse(&category_raw)
        .ok_or_else(|| sqlx::Error::Decode(
            format!("unknown category '{}'", category_raw).into(),
        ))?;

    let stats_raw: String = row.get("stats");
    let stats: ClusterStats =
        serde_json::from_str(&stats_raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Cluster {
        id: row.get("id"),
        headline: row.get("headline"),
        summary: row.get("summary"),
        category,
        main_image_url: row.get("main_image_url"),
        created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
        stats,
    })
}
