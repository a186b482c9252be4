use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clustering::{cluster_articles, refine_recent_clusters};
use crate::db::Database;
use crate::domain::{Article, Cluster};
use crate::enrich::Enricher;
use crate::entity::{disable_ner, ner_disabled, EntityExtractor, NerConfig};
use crate::labeler::{ClusterLabel, Labeler};
use crate::stats::{compute_stats, main_image_url};
use crate::vector::{Embedder, MiniLmConfig};
use crate::TARGET_PIPELINE;

/// Unclustered articles older than this are left behind.
const SELECT_WINDOW_HOURS: i64 = 72;
/// At most this many articles are clustered per run.
const SELECT_LIMIT: i64 = 50;

/// What one pipeline run accomplished.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub clusters_generated: usize,
    pub clusters_split: usize,
}

/// Owns the long-lived pieces of the analysis pipeline: the store handle,
/// both inference models, and the labeler. Models are initialized lazily on
/// the first run and shared immutably afterwards.
pub struct Pipeline {
    db: Database,
    labeler: Labeler,
    run_lock: Mutex<()>,
    embedder: OnceCell<Arc<Embedder>>,
    extractor: OnceCell<Option<Arc<EntityExtractor>>>,
}

impl Pipeline {
    pub fn new(db: Database, labeler: Labeler) -> Self {
        Self {
            db,
            labeler,
            run_lock: Mutex::new(()),
            embedder: OnceCell::new(),
            extractor: OnceCell::new(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// One end-to-end run: select, enrich, cluster, label, commit, refine.
    ///
    /// Holds the run lock for the whole cycle; two concurrent runs would
    /// double-assign the same unclustered articles.
    pub async fn run(&self) -> Result<RunSummary> {
        let _guard = self.run_lock.lock().await;

        let articles = self
            .db
            .select_unclustered(SELECT_WINDOW_HOURS, SELECT_LIMIT)
            .await?;
        info!(target: TARGET_PIPELINE, "Selected {} unclustered articles", articles.len());

        let mut clusters_generated = 0;
        if articles.len() >= 2 {
            let embedder = self.embedder().await?;
            let enricher = Enricher::new(embedder, self.extractor().await);
            let enriched = enricher.enrich_all(articles).await;
            self.db.persist_enrichment(&enriched).await?;

            // select_unclustered already orders by pub_date, but clustering
            // correctness depends on it, so the guarantee lives here too.
            let mut embedded: Vec<Article> = enriched
                .into_iter()
                .filter(|a| a.embedding.is_some())
                .collect();
            embedded.sort_by(|a, b| a.pub_date.cmp(&b.pub_date));

            let micro_clusters = cluster_articles(embedded);

            let groups: Vec<Vec<Article>> =
                micro_clusters.iter().map(|c| c.members.clone()).collect();
            let labels = self.labeler.label_all(&groups).await;

            let mut clusters = Vec::with_capacity(micro_clusters.len());
            let mut assignment = Vec::new();
            for (micro, label) in micro_clusters.iter().zip(labels) {
                let cluster = build_cluster(&micro.members, label);
                for member in &micro.members {
                    assignment.push((member.id.clone(), cluster.id.clone()));
                }
                clusters.push(cluster);
            }

            self.db.commit_clusters(&clusters, &assignment).await?;
            clusters_generated = clusters.len();
        }

        let clusters_split = refine_recent_clusters(&self.db, &self.labeler).await?;

        info!(
            target: TARGET_PIPELINE,
            "Pipeline run complete: {} clusters generated, {} split",
            clusters_generated, clusters_split
        );
        Ok(RunSummary {
            clusters_generated,
            clusters_split,
        })
    }

    /// The embedding model, initialized on first use. Failure here is fatal
    /// for the requesting run and retried on the next.
    async fn embedder(&self) -> Result<Arc<Embedder>> {
        self.embedder
            .get_or_try_init(|| async {
                Ok(Arc::new(Embedder::init(MiniLmConfig::default()).await?))
            })
            .await
            .cloned()
    }

    /// The NER model, initialized on first use. Failure disables NER for the
    /// process lifetime; the pipeline keeps running on text vectors alone.
    async fn extractor(&self) -> Option<Arc<EntityExtractor>> {
        if ner_disabled() {
            return None;
        }
        self.extractor
            .get_or_init(|| async {
                match EntityExtractor::init(NerConfig::default()).await {
                    Ok(extractor) => Some(Arc::new(extractor)),
                    Err(e) => {
                        warn!(
                            target: TARGET_PIPELINE,
                            "NER initialization failed: {}; disabling entity extraction", e
                        );
                        disable_ner();
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

/// Assemble a persisted cluster record from its members and label.
pub(crate) fn build_cluster(members: &[Article], label: ClusterLabel) -> Cluster {
    Cluster {
        id: Uuid::new_v4().to_string(),
        headline: label.headline,
        summary: label.summary,
        category: label.category,
        main_image_url: main_image_url(members),
        created_at: Utc::now(),
        stats: compute_stats(members),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BiasRating, Factuality};
    use crate::LLMClient;
    use ollama_rs::Ollama;

    fn test_labeler() -> Labeler {
        Labeler::new(crate::LLMParams {
            llm_client: LLMClient::Ollama(Ollama::new("http://localhost".to_string(), 11434)),
            model: "test-model".into(),
            temperature: 0.0,
        })
    }

    #[tokio::test]
    async fn run_on_an_empty_store_changes_nothing() {
        let db = Database::in_memory().await.unwrap();
        let pipeline = Pipeline::new(db.clone(), test_labeler());

        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.clusters_generated, 0);
        assert_eq!(summary.clusters_split, 0);
        assert!(db.load_recent_clusters(24, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_single_article_is_left_for_the_next_run() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_articles(&[Article {
            id: String::new(),
            source_id: "hindu".into(),
            source_name: "The Hindu".into(),
            bias_rating: BiasRating::CenterLeft,
            factuality: Factuality::VeryHigh,
            headline: "Lone story of the hour".into(),
            summary: "Only one publisher has reported this so far.".into(),
            url: "https://example.in/lone".into(),
            image_url: None,
            pub_date: Utc::now(),
            fetched_at: Utc::now(),
            cluster_id: None,
            embedding: None,
            entities: None,
        }])
        .await
        .unwrap();

        let pipeline = Pipeline::new(db.clone(), test_labeler());
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.clusters_generated, 0);
        let remaining = db.select_unclustered(72, 50).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].cluster_id.is_none());
    }
}
