use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::debug;

use super::{
    CENTROID_NEW_WEIGHT, CENTROID_OLD_WEIGHT, CLUSTERING_THRESHOLD, DUPLICATE_THRESHOLD,
    TIME_WINDOW_HOURS,
};
use crate::domain::Article;
use crate::vector::{cosine_similarity, l2_normalize};
use crate::TARGET_PIPELINE;

/// An in-memory story cluster under construction.
pub struct MicroCluster {
    pub centroid: Vec<f32>,
    pub members: Vec<Article>,
    pub latest_time: DateTime<Utc>,
}

/// Single-pass online clustering.
///
/// The result depends on input order: feed articles in ascending `pub_date`
/// so earlier events anchor clusters. Articles without an embedding are
/// skipped. Cluster scan order is insertion order; the first duplicate match
/// wins, and similarity ties go to the earliest-created cluster.
pub fn cluster_articles(articles: Vec<Article>) -> Vec<MicroCluster> {
    let window = ChronoDuration::hours(TIME_WINDOW_HOURS);
    let mut clusters: Vec<MicroCluster> = Vec::new();

    for article in articles {
        let Some(vector) = article.embedding.clone() else {
            debug!(target: TARGET_PIPELINE, "Skipping article {} with no embedding", article.id);
            continue;
        };
        let time = article.pub_date;
        let headline = article.normalized_headline();

        let mut duplicate_of: Option<usize> = None;
        let mut best: Option<(usize, f32)> = None;

        for (idx, cluster) in clusters.iter().enumerate() {
            // The time check precedes the duplicate check: even an identical
            // headline outside the window starts a fresh story.
            if (time - cluster.latest_time).abs() > window {
                continue;
            }

            let is_duplicate = cluster.members.iter().any(|member| {
                member.normalized_headline() == headline
                    || member.embedding.as_ref().is_some_and(|existing| {
                        cosine_similarity(&vector, existing).unwrap_or(0.0)
                            >= DUPLICATE_THRESHOLD
                    })
            });
            if is_duplicate {
                duplicate_of = Some(idx);
                break;
            }

            let similarity = cosine_similarity(&vector, &cluster.centroid).unwrap_or(-1.0);
            match best {
                Some((_, best_similarity)) if similarity <= best_similarity => {}
                _ => best = Some((idx, similarity)),
            }
        }

        if let Some(idx) = duplicate_of {
            // Duplicates join without re-weighting the centroid; a burst of
            // near-identical wire copy must not drag the cluster around.
            let cluster = &mut clusters[idx];
            if time > cluster.latest_time {
                cluster.latest_time = time;
            }
            cluster.members.push(article);
            continue;
        }

        match best {
            Some((idx, similarity)) if similarity >= CLUSTERING_THRESHOLD => {
                let cluster = &mut clusters[idx];
                let blended: Vec<f32> = cluster
                    .centroid
                    .iter()
                    .zip(vector.iter())
                    .map(|(old, new)| CENTROID_OLD_WEIGHT * old + CENTROID_NEW_WEIGHT * new)
                    .collect();
                cluster.centroid = l2_normalize(&blended);
                if time > cluster.latest_time {
                    cluster.latest_time = time;
                }
                cluster.members.push(article);
            }
            _ => {
                clusters.push(MicroCluster {
                    centroid: vector,
                    members: vec![article],
                    latest_time: time,
                });
            }
        }
    }

    debug!(target: TARGET_PIPELINE, "Clustered into {} micro-clusters", clusters.len());
    clusters
}
