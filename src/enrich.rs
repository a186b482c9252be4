use anyhow::Result;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, warn};

use crate::domain::Article;
use crate::entity::EntityExtractor;
use crate::vector::{l2_normalize, Embedder, TARGET_VECTOR};

/// Weight of the headline+summary vector in the fused embedding.
const TEXT_WEIGHT: f32 = 0.7;
/// Weight of the entity-string vector in the fused embedding.
const ENTITY_WEIGHT: f32 = 0.3;

/// Orchestrates the embedding and entity models into one fused vector plus
/// entity list per article. Inference runs on the blocking pool, one article
/// at a time: neither model is reentrant.
pub struct Enricher {
    embedder: Arc<Embedder>,
    extractor: Option<Arc<EntityExtractor>>,
}

impl Enricher {
    pub fn new(embedder: Arc<Embedder>, extractor: Option<Arc<EntityExtractor>>) -> Self {
        Self {
            embedder,
            extractor,
        }
    }

    /// Enrich a batch sequentially. A failed article keeps its original
    /// (possibly null) vector and the batch continues.
    pub async fn enrich_all(&self, mut articles: Vec<Article>) -> Vec<Article> {
        for article in articles.iter_mut() {
            if let Err(e) = self.enrich_one(article).await {
                warn!(
                    target: TARGET_VECTOR,
                    "Enrichment failed for article {}: {}; continuing without a vector",
                    article.id, e
                );
            }
        }
        articles
    }

    async fn enrich_one(&self, article: &mut Article) -> Result<()> {
        let text = article.text_for_analysis();
        let v_text = self.embed(text).await?;

        let entities = match &self.extractor {
            Some(extractor) => {
                let extractor = Arc::clone(extractor);
                let text = article.text_for_analysis();
                // Extraction failures, including a panicked worker, downgrade
                // to "no entities"; the text vector must survive either way.
                match task::spawn_blocking(move || extractor.extract(&text)).await {
                    Ok(Ok(entities)) => Some(entities),
                    Ok(Err(e)) => {
                        warn!(
                            target: TARGET_VECTOR,
                            "Entity extraction failed for article {}: {}", article.id, e
                        );
                        Some(Vec::new())
                    }
                    Err(e) => {
                        warn!(
                            target: TARGET_VECTOR,
                            "Entity extraction task aborted for article {}: {}", article.id, e
                        );
                        Some(Vec::new())
                    }
                }
            }
            None => None,
        };

        let fused = match &entities {
            Some(list) if !list.is_empty() => {
                let v_ent = self.embed(list.join(" ")).await?;
                let blended: Vec<f32> = v_text
                    .iter()
                    .zip(v_ent.iter())
                    .map(|(t, e)| TEXT_WEIGHT * t + ENTITY_WEIGHT * e)
                    .collect();
                l2_normalize(&blended)
            }
            _ => v_text,
        };

        debug!(
            target: TARGET_VECTOR,
            "Enriched article {} ({} entities)",
            article.id,
            entities.as_ref().map(|e| e.len()).unwrap_or(0)
        );

        article.embedding = Some(fused);
        article.entities = entities;
        Ok(())
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        task::spawn_blocking(move || embedder.embed(&text)).await?
    }
}
