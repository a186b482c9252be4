use crate::domain::{Article, BiasDistribution, Blindspot, ClusterStats};

/// Below this share of coverage a side is considered absent.
const BLINDSPOT_FLOOR_PCT: i64 = 15;
/// Above this share of coverage the opposite side dominates.
const BLINDSPOT_DOMINANCE_PCT: i64 = 50;

/// Compute bias distribution and blindspot for a cluster's members.
///
/// Bucketing is by substring over the bias label, Left checked first: a
/// "Center Left" publisher counts Left and "Center Right" counts Right.
/// Percentages are rounded with center absorbing the drift so the three
/// always sum to 100.
pub fn compute_stats(members: &[Article]) -> ClusterStats {
    let total = members.len() as i64;

    let mut left = 0i64;
    let mut right = 0i64;
    for member in members {
        if member.bias_rating.leans_left() {
            left += 1;
        } else if member.bias_rating.leans_right() {
            right += 1;
        }
    }

    let left_pct = ((100 * left) as f64 / total as f64).round() as i64;
    let right_pct = ((100 * right) as f64 / total as f64).round() as i64;
    let center_pct = 100 - left_pct - right_pct;

    let blindspot = if right_pct < BLINDSPOT_FLOOR_PCT && left_pct > BLINDSPOT_DOMINANCE_PCT {
        Blindspot::Right
    } else if left_pct < BLINDSPOT_FLOOR_PCT && right_pct > BLINDSPOT_DOMINANCE_PCT {
        Blindspot::Left
    } else {
        Blindspot::None
    };

    ClusterStats {
        total_sources: total,
        bias_distribution: BiasDistribution {
            left: left_pct,
            center: center_pct,
            right: right_pct,
        },
        blindspot,
    }
}

/// First member in insertion order with a non-empty image.
pub fn main_image_url(members: &[Article]) -> Option<String> {
    members
        .iter()
        .find_map(|m| m.image_url.as_ref().filter(|u| !u.is_empty()).cloned())
}
