use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Publisher bias rating on the seven-step political spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiasRating {
    #[serde(rename = "Far Left")]
    FarLeft,
    Left,
    #[serde(rename = "Center Left")]
    CenterLeft,
    Center,
    #[serde(rename = "Center Right")]
    CenterRight,
    Right,
    #[serde(rename = "Far Right")]
    FarRight,
}

impl BiasRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiasRating::FarLeft => "Far Left",
            BiasRating::Left => "Left",
            BiasRating::CenterLeft => "Center Left",
            BiasRating::Center => "Center",
            BiasRating::CenterRight => "Center Right",
            BiasRating::Right => "Right",
            BiasRating::FarRight => "Far Right",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "Far Left" => Some(BiasRating::FarLeft),
            "Left" => Some(BiasRating::Left),
            "Center Left" => Some(BiasRating::CenterLeft),
            "Center" => Some(BiasRating::Center),
            "Center Right" => Some(BiasRating::CenterRight),
            "Right" => Some(BiasRating::Right),
            "Far Right" => Some(BiasRating::FarRight),
            _ => None,
        }
    }

    /// Substring bucketing: any label containing "Left" counts toward the
    /// left axis, so "Center Left" lands left, not center. Checked before
    /// `leans_right` wherever both apply.
    pub fn leans_left(&self) -> bool {
        self.as_str().contains("Left")
    }

    /// Any label containing "Right" counts toward the right axis; "Center
    /// Right" lands right. Only consulted when `leans_left` is false.
    pub fn leans_right(&self) -> bool {
        self.as_str().contains("Right")
    }
}

/// Publisher factuality track record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Factuality {
    #[serde(rename = "Very High")]
    VeryHigh,
    High,
    Mixed,
    Low,
}

impl Factuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Factuality::VeryHigh => "Very High",
            Factuality::High => "High",
            Factuality::Mixed => "Mixed",
            Factuality::Low => "Low",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "Very High" => Some(Factuality::VeryHigh),
            "High" => Some(Factuality::High),
            "Mixed" => Some(Factuality::Mixed),
            "Low" => Some(Factuality::Low),
            _ => None,
        }
    }
}

/// Neutral story category assigned by the labeler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Politics,
    Business,
    Technology,
    Sports,
    Entertainment,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "Politics",
            Category::Business => "Business",
            Category::Technology => "Technology",
            Category::Sports => "Sports",
            Category::Entertainment => "Entertainment",
            Category::General => "General",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "Politics" => Some(Category::Politics),
            "Business" => Some(Category::Business),
            "Technology" => Some(Category::Technology),
            "Sports" => Some(Category::Sports),
            "Entertainment" => Some(Category::Entertainment),
            "General" => Some(Category::General),
            _ => None,
        }
    }
}

/// One publisher-provided news item. The single canonical record type:
/// RSS-shaped JSON and SQL rows each translate into this and nothing else
/// crosses component boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(default)]
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub bias_rating: BiasRating,
    pub factuality: Factuality,
    pub headline: String,
    pub summary: String,
    pub url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub pub_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
}

impl Article {
    /// Stable identifier derived from the source URL, so re-fetches of the
    /// same piece upsert onto one row.
    pub fn id_for_url(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.trim().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Headline and summary joined the way every model stage consumes them.
    pub fn text_for_analysis(&self) -> String {
        format!("{}. {}", self.headline, self.summary)
    }

    /// Headline normalized for duplicate comparison.
    pub fn normalized_headline(&self) -> String {
        self.headline.trim().to_lowercase()
    }
}

/// Percentage split of coverage across the political spectrum. The three
/// values always sum to 100; center absorbs rounding drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasDistribution {
    pub left: i64,
    pub center: i64,
    pub right: i64,
}

/// Side of the spectrum that is ignoring a story, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blindspot {
    Left,
    Right,
    None,
}

impl Blindspot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Blindspot::Left => "Left",
            Blindspot::Right => "Right",
            Blindspot::None => "None",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStats {
    pub total_sources: i64,
    pub bias_distribution: BiasDistribution,
    pub blindspot: Blindspot,
}

/// A group of articles judged to cover the same event, with a neutral label
/// and bias statistics. Clusters reference their members through
/// `Article::cluster_id`; they do not own the article rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    pub headline: String,
    pub summary: String,
    pub category: Category,
    #[serde(default)]
    pub main_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub stats: ClusterStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_id_is_stable_for_a_url() {
        let a = Article::id_for_url("https://example.in/news/1");
        let b = Article::id_for_url("https://example.in/news/1");
        let c = Article::id_for_url("https://example.in/news/2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn center_left_counts_toward_left() {
        assert!(BiasRating::CenterLeft.leans_left());
        assert!(!BiasRating::CenterLeft.leans_right());
        assert!(BiasRating::CenterRight.leans_right());
        assert!(!BiasRating::Center.leans_left());
        assert!(!BiasRating::Center.leans_right());
    }

    #[test]
    fn bias_labels_round_trip() {
        for rating in [
            BiasRating::FarLeft,
            BiasRating::Left,
            BiasRating::CenterLeft,
            BiasRating::Center,
            BiasRating::CenterRight,
            BiasRating::Right,
            BiasRating::FarRight,
        ] {
            assert_eq!(BiasRating::parse(rating.as_str()), Some(rating));
        }
        assert_eq!(BiasRating::parse("Leftish"), None);
    }
}
