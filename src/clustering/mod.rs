// Module declarations
pub mod online;
pub mod refine;
#[cfg(test)]
mod tests;

// Re-export key functions for the pipeline
pub use online::{cluster_articles, MicroCluster};
pub use refine::refine_recent_clusters;

/// Articles further than this from a cluster's latest member never join it
pub const TIME_WINDOW_HOURS: i64 = 48;

/// Minimum centroid similarity required to assign an article to an existing cluster
pub const CLUSTERING_THRESHOLD: f32 = 0.55;

/// Member similarity at or above this absorbs the article as a duplicate
pub const DUPLICATE_THRESHOLD: f32 = 0.90;

/// Centroid update weights: old centroid keeps 0.8, the new member contributes 0.2
pub const CENTROID_OLD_WEIGHT: f32 = 0.8;
pub const CENTROID_NEW_WEIGHT: f32 = 0.2;

/// Average member-to-centroid similarity below which a cluster is re-clustered
pub const COHERENCE_THRESHOLD: f32 = 0.60;

/// The refiner audits clusters created within this trailing window
pub const REFINER_WINDOW_HOURS: i64 = 24;

/// Clusters with fewer embedded members than this are left alone
pub const REFINER_MIN_MEMBERS: usize = 4;
