use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_clusters (
                id TEXT PRIMARY KEY,
                headline TEXT NOT NULL,
                summary TEXT NOT NULL,
                category TEXT NOT NULL,
                main_image_url TEXT,
                created_at TEXT NOT NULL,
                stats TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_news_clusters_created_at ON news_clusters (created_at DESC);

            CREATE TABLE IF NOT EXISTS news_articles (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_name TEXT NOT NULL,
                bias_rating TEXT NOT NULL,
                factuality TEXT NOT NULL,
                headline TEXT NOT NULL,
                summary TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                image_url TEXT,
                pub_date TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                cluster_id TEXT,
                embedding TEXT,
                entities TEXT,
                FOREIGN KEY (cluster_id) REFERENCES news_clusters (id)
            );
            CREATE INDEX IF NOT EXISTS idx_news_articles_cluster_id ON news_articles (cluster_id);
            CREATE INDEX IF NOT EXISTS idx_news_articles_pub_date ON news_articles (pub_date DESC);
            CREATE INDEX IF NOT EXISTS idx_news_articles_unclustered ON news_articles (pub_date)
                WHERE cluster_id IS NULL;
            "#,
        )
        .execute(&mut *conn)
        .await?;
        info!(target: TARGET_DB, "Tables ensured to exist");

        Ok(())
    }
}
