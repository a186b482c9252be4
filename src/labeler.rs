use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{Article, Category};
use crate::llm::generate_llm_response;
use crate::prompt::cluster_label_prompt;
use crate::{LLMParams, TARGET_LLM_REQUEST};

/// Clusters labeled concurrently per batch; batches run back to back so the
/// external model sees bounded fan-out.
const LABEL_BATCH_SIZE: usize = 5;

/// Neutral label produced for one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterLabel {
    pub headline: String,
    pub summary: String,
    pub category: Category,
}

/// Produces neutral headline/summary/category labels via the external
/// generative model, with a deterministic fallback when the model
/// misbehaves.
pub struct Labeler {
    params: LLMParams,
}

impl Labeler {
    pub fn new(params: LLMParams) -> Self {
        Self { params }
    }

    /// Label a list of clusters, [`LABEL_BATCH_SIZE`] at a time.
    pub async fn label_all(&self, groups: &[Vec<Article>]) -> Vec<ClusterLabel> {
        let mut labels = Vec::with_capacity(groups.len());
        for batch in groups.chunks(LABEL_BATCH_SIZE) {
            let batch_labels =
                join_all(batch.iter().map(|members| self.label_cluster(members))).await;
            labels.extend(batch_labels);
        }
        labels
    }

    /// Label one cluster from its members. Never fails: transport, parse,
    /// and schema errors all land on the first member's own words.
    pub async fn label_cluster(&self, members: &[Article]) -> ClusterLabel {
        let prompt = cluster_label_prompt(members);

        if let Some(response) = generate_llm_response(&prompt, &self.params).await {
            match parse_label_response(&response) {
                Some(label) => {
                    debug!(target: TARGET_LLM_REQUEST, "Labeled cluster: {}", label.headline);
                    return label;
                }
                None => {
                    warn!(
                        target: TARGET_LLM_REQUEST,
                        "Unusable label response ({} chars); falling back to first member",
                        response.len()
                    );
                }
            }
        }

        fallback_label(members)
    }
}

/// Parse the model's JSON label. Models wrap JSON in prose or code fences
/// often enough that the outermost braces are located first.
fn parse_label_response(response: &str) -> Option<ClusterLabel> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }

    let json: Value = serde_json::from_str(&response[start..=end]).ok()?;

    let headline = json.get("headline")?.as_str()?.trim();
    let summary = json.get("summary")?.as_str()?.trim();
    let category = Category::parse(json.get("category")?.as_str()?)?;

    if headline.is_empty() || summary.is_empty() {
        return None;
    }

    Some(ClusterLabel {
        headline: headline.to_string(),
        summary: summary.to_string(),
        category,
    })
}

/// Deterministic label when the generative model fails: the first member
/// speaks for the cluster.
fn fallback_label(members: &[Article]) -> ClusterLabel {
    let first = members.first();
    ClusterLabel {
        headline: first.map(|m| m.headline.clone()).unwrap_or_default(),
        summary: first.map(|m| m.summary.clone()).unwrap_or_default(),
        category: Category::General,
    }
}
