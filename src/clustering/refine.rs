use anyhow::Result;
use tracing::{debug, info};

use super::online::cluster_articles;
use super::{COHERENCE_THRESHOLD, REFINER_MIN_MEMBERS, REFINER_WINDOW_HOURS};
use crate::db::Database;
use crate::domain::Article;
use crate::labeler::Labeler;
use crate::pipeline::build_cluster;
use crate::vector::{cosine_similarity, l2_normalize};
use crate::TARGET_PIPELINE;

/// Audit recently created clusters and split the incoherent ones.
///
/// A cluster qualifies when it was created in the last 24 hours and at least
/// four members carry embeddings. Coherence is the average member cosine to
/// the summed-and-normalized centroid; below threshold the members are
/// re-clustered and, if they fall apart into two or more groups, the old
/// cluster is transactionally replaced. Returns the number of splits applied.
pub async fn refine_recent_clusters(db: &Database, labeler: &Labeler) -> Result<usize> {
    let clusters = db.load_recent_clusters(REFINER_WINDOW_HOURS, -1).await?;
    let mut splits = 0usize;

    for cluster in clusters {
        let members = db.load_cluster_articles(&cluster.id).await?;
        let embedded_count = members.iter().filter(|m| m.embedding.is_some()).count();
        if embedded_count < REFINER_MIN_MEMBERS {
            continue;
        }

        let Some(coherence) = average_coherence(&members) else {
            continue;
        };
        if coherence >= COHERENCE_THRESHOLD {
            debug!(
                target: TARGET_PIPELINE,
                "Cluster {} coherent ({:.3}); leaving as is", cluster.id, coherence
            );
            continue;
        }

        info!(
            target: TARGET_PIPELINE,
            "Cluster {} coherence {:.3} below {}; re-clustering {} members",
            cluster.id, coherence, COHERENCE_THRESHOLD, members.len()
        );

        let (mut with_vectors, without_vectors): (Vec<Article>, Vec<Article>) =
            members.into_iter().partition(|m| m.embedding.is_some());
        with_vectors.sort_by(|a, b| a.pub_date.cmp(&b.pub_date));

        let mut sub_clusters = cluster_articles(with_vectors);
        if sub_clusters.len() < 2 {
            debug!(
                target: TARGET_PIPELINE,
                "Cluster {} re-clustered into one group; leaving as is", cluster.id
            );
            continue;
        }

        // Members without usable vectors follow the largest sub-cluster so
        // the split leaves no orphans.
        if !without_vectors.is_empty() {
            let largest = sub_clusters
                .iter()
                .enumerate()
                .max_by_key(|(_, c)| c.members.len())
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            sub_clusters[largest].members.extend(without_vectors);
        }

        let groups: Vec<Vec<Article>> =
            sub_clusters.iter().map(|c| c.members.clone()).collect();
        let labels = labeler.label_all(&groups).await;

        let mut replacements = Vec::with_capacity(sub_clusters.len());
        let mut assignment = Vec::new();
        for (micro, label) in sub_clusters.iter().zip(labels) {
            let replacement = build_cluster(&micro.members, label);
            for member in &micro.members {
                assignment.push((member.id.clone(), replacement.id.clone()));
            }
            replacements.push(replacement);
        }

        if db
            .split_cluster(&cluster.id, &replacements, &assignment)
            .await?
        {
            splits += 1;
        }
    }

    if splits > 0 {
        info!(target: TARGET_PIPELINE, "Refiner split {} clusters", splits);
    }
    Ok(splits)
}

/// Average cosine similarity of each embedded member to the cluster's
/// summed-and-normalized centroid. `None` when the vectors are unusable.
pub(crate) fn average_coherence(members: &[Article]) -> Option<f32> {
    let vectors: Vec<&Vec<f32>> = members.iter().filter_map(|m| m.embedding.as_ref()).collect();
    let first = vectors.first()?;
    let dim = first.len();

    let mut sum = vec![0f32; dim];
    for vector in &vectors {
        if vector.len() != dim {
            return None;
        }
        for (acc, x) in sum.iter_mut().zip(vector.iter()) {
            *acc += x;
        }
    }
    let centroid = l2_normalize(&sum);

    let mut total = 0f32;
    for vector in &vectors {
        total += cosine_similarity(vector, &centroid).ok()?;
    }
    Some(total / vectors.len() as f32)
}
