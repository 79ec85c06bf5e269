//! Spatial consensus clustering.
//!
//! Turns a ranked match list into the single most defensible cluster of
//! mutually reinforcing matches, then reduces that cluster to a coordinate.
//!
//! # Algorithm
//!
//! 1. Shortlist the top `search_depth` matches.
//! 2. A top match above [`NEAR_PERFECT_SIMILARITY`] is returned alone.
//! 3. Each of the top [`SEED_COUNT`] matches seeds a cluster of every shortlisted
//!    match within `cluster_radius_m` of it.
//! 4. Clusters of four or more lose their IQR distance outliers ([`remove_outliers`]).
//! 5. Clusters below `min_cluster_candidates` are discarded unless the seed is a
//!    near-anchor (similarity above [`NEAR_ANCHOR_SIMILARITY`]).
//! 6. Survivors are scored `Σ score² × min(len / min, 1.5)`; the best one wins.
//! 7. With no survivor, everything within [`FALLBACK_RADIUS_M`] of the top match is used.
//! 8. The winner is sorted by similarity and truncated to `max_cluster_candidates`.
//!
//! The centroid is a per-axis weighted median ([`weighted_median_centroid`]) with
//! low-temperature softmax weights, so one far outlier cannot drag it.

use crate::catalog::Match;
use crate::config::GeoConfig;
use crate::geo::haversine_m;
use serde::Serialize;

/// A top match above this similarity is treated as an image-exact anchor.
pub const NEAR_PERFECT_SIMILARITY: f64 = 0.99;
/// A seed above this similarity may stand alone below the minimum cluster size.
pub const NEAR_ANCHOR_SIMILARITY: f64 = 0.95;
/// Number of top matches tried as cluster seeds.
pub const SEED_COUNT: usize = 10;
/// Radius around the top match used when no seed yields a valid cluster.
pub const FALLBACK_RADIUS_M: f64 = 10_000.0;
/// Softmax temperature for centroid weights.
pub const SOFTMAX_TEMPERATURE: f64 = 0.05;
/// Smallest cluster the IQR filter touches.
pub const MIN_OUTLIER_SAMPLE: usize = 4;

const MAX_SIZE_BONUS: f64 = 1.5;

/// How the winning cluster was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    /// Single top match above [`NEAR_PERFECT_SIMILARITY`].
    NearPerfect,
    /// Seed cluster meeting the minimum size.
    Consensus,
    /// Undersized seed cluster kept because its seed is a near-anchor.
    NearAnchor,
    /// No seed cluster survived; radius search around the top match.
    FallbackRadius,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusCluster {
    /// Members, most similar first.
    pub members: Vec<Match>,
    pub kind: ClusterKind,
    /// Cluster score before truncation; zero for near-perfect and fallback clusters.
    pub score: f64,
    /// Members dropped by the IQR filter from the winning seed cluster.
    pub outliers_removed: usize,
}

impl ConsensusCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// True for the two kinds allowed outside `[min, max]` cluster bounds.
    pub fn is_size_exempt(&self) -> bool {
        matches!(self.kind, ClusterKind::NearPerfect | ClusterKind::FallbackRadius)
    }
}

/// Geographic point on the WGS84 sphere, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

/// Select the consensus cluster from `matches` (any order; ranked internally).
///
/// Returns an empty cluster only when `matches` is empty or the top match has
/// non-finite coordinates; callers treat that as an aggregation failure.
pub fn pick_consensus_cluster(matches: &[Match], config: &GeoConfig) -> ConsensusCluster {
    let mut shortlist = matches.to_vec();
    shortlist.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    shortlist.truncate(config.search_depth.max(1));

    let Some(top) = shortlist.first() else {
        return ConsensusCluster {
            members: Vec::new(),
            kind: ClusterKind::FallbackRadius,
            score: 0.0,
            outliers_removed: 0,
        };
    };

    if top.similarity > NEAR_PERFECT_SIMILARITY {
        tracing::debug!(id = %top.id, similarity = top.similarity, "near-perfect anchor");
        return ConsensusCluster {
            members: vec![top.clone()],
            kind: ClusterKind::NearPerfect,
            score: 0.0,
            outliers_removed: 0,
        };
    }

    let mut best: Option<(f64, Vec<Match>, bool, usize)> = None;
    for seed in shortlist.iter().take(SEED_COUNT) {
        let collected = within_radius(&shortlist, seed, config.cluster_radius_m);
        let before = collected.len();
        let members = if config.outlier_rejection && collected.len() >= MIN_OUTLIER_SAMPLE {
            remove_outliers(&collected, config.iqr_multiplier)
        } else {
            collected
        };
        let removed = before - members.len();

        let undersized = members.len() < config.min_cluster_candidates;
        if undersized && seed.similarity <= NEAR_ANCHOR_SIMILARITY {
            continue;
        }

        let score = cluster_score(&members, config.min_cluster_candidates);
        tracing::trace!(seed = %seed.id, size = members.len(), removed, score, "seed cluster");
        if best.as_ref().map_or(true, |(s, ..)| score > *s) {
            best = Some((score, members, undersized, removed));
        }
    }

    let mut cluster = match best {
        Some((score, members, undersized, outliers_removed)) => ConsensusCluster {
            members,
            kind: if undersized {
                ClusterKind::NearAnchor
            } else {
                ClusterKind::Consensus
            },
            score,
            outliers_removed,
        },
        None => {
            let members = within_radius(&shortlist, top, FALLBACK_RADIUS_M);
            tracing::debug!(
                size = members.len(),
                "no seed cluster reached minimum size, using fallback radius"
            );
            ConsensusCluster {
                members,
                kind: ClusterKind::FallbackRadius,
                score: 0.0,
                outliers_removed: 0,
            }
        }
    };

    cluster
        .members
        .sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    cluster.members.truncate(config.max_cluster_candidates);
    cluster
}

fn within_radius(shortlist: &[Match], center: &Match, radius_m: f64) -> Vec<Match> {
    shortlist
        .iter()
        .filter(|m| haversine_m(center.lat, center.lon, m.lat, m.lon) <= radius_m)
        .cloned()
        .collect()
}

/// `Σ score² × min(len / min_candidates, 1.5)` with `score = (similarity + 1) / 2`.
pub fn cluster_score(members: &[Match], min_candidates: usize) -> f64 {
    let evidence: f64 = members.iter().map(|m| m.score().powi(2)).sum();
    let size_factor = members.len() as f64 / min_candidates.max(1) as f64;
    evidence * size_factor.min(MAX_SIZE_BONUS)
}

/// Drop members whose distance to the cluster's mean centroid exceeds
/// `Q3 + multiplier × (Q3 − Q1)`.
///
/// Clusters with fewer than [`MIN_OUTLIER_SAMPLE`] members are returned unchanged.
/// Survivors keep their input order.
pub fn remove_outliers(cluster: &[Match], multiplier: f64) -> Vec<Match> {
    if cluster.len() < MIN_OUTLIER_SAMPLE {
        return cluster.to_vec();
    }

    let n = cluster.len() as f64;
    let mean_lat = cluster.iter().map(|m| m.lat).sum::<f64>() / n;
    let mean_lon = cluster.iter().map(|m| m.lon).sum::<f64>() / n;
    let distances: Vec<f64> = cluster
        .iter()
        .map(|m| haversine_m(mean_lat, mean_lon, m.lat, m.lon))
        .collect();

    let mut sorted = distances.clone();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let fence = q3 + multiplier * (q3 - q1);

    let kept: Vec<Match> = cluster
        .iter()
        .zip(&distances)
        .filter(|(_, &d)| d <= fence)
        .map(|(m, _)| m.clone())
        .collect();
    if kept.len() < cluster.len() {
        tracing::trace!(
            total = cluster.len(),
            kept = kept.len(),
            fence_m = fence,
            "IQR outlier rejection"
        );
    }
    kept
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let pos = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Softmax of member scores at [`SOFTMAX_TEMPERATURE`]. Sums to one.
pub fn softmax_weights(members: &[Match]) -> Vec<f64> {
    let Some(max) = members.iter().map(Match::score).reduce(f64::max) else {
        return Vec::new();
    };
    let raw: Vec<f64> = members
        .iter()
        .map(|m| ((m.score() - max) / SOFTMAX_TEMPERATURE).exp())
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Per-axis weighted median of the members' coordinates.
///
/// Along each axis the members are sorted and the value at which cumulative
/// weight first reaches half of the total is taken. `None` for an empty slice.
pub fn weighted_median_centroid(members: &[Match]) -> Option<Centroid> {
    if members.is_empty() {
        return None;
    }
    let weights = softmax_weights(members);
    let lat = weighted_median(members.iter().map(|m| m.lat).zip(weights.iter().copied()))?;
    let lon = weighted_median(members.iter().map(|m| m.lon).zip(weights.iter().copied()))?;
    Some(Centroid { lat, lon })
}

fn weighted_median(samples: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let mut samples: Vec<(f64, f64)> = samples.collect();
    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = samples.iter().map(|(_, w)| w).sum::<f64>() / 2.0;

    let mut cumulative = 0.0;
    for &(value, weight) in &samples {
        cumulative += weight;
        if cumulative >= half {
            return Some(value);
        }
    }
    samples.last().map(|&(value, _)| value)
}

/// Weighted mean haversine distance (meters) of members from `centroid`,
/// using the same softmax weights as the centroid.
pub fn weighted_spread_m(members: &[Match], centroid: Centroid) -> f64 {
    let weights = softmax_weights(members);
    members
        .iter()
        .zip(weights)
        .map(|(m, w)| w * haversine_m(centroid.lat, centroid.lon, m.lat, m.lon))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(id: &str, lat: f64, lon: f64, similarity: f64) -> Match {
        Match::new(id, id, lat, lon, similarity)
    }

    #[test]
    fn near_perfect_anchor_stands_alone() {
        let mut matches = vec![at("anchor", 48.8584, 2.2945, 0.995)];
        for i in 0..19 {
            matches.push(at(&format!("m{i}"), 40.0 + i as f64 * 0.001, -3.7, 0.9));
        }
        let cluster = pick_consensus_cluster(&matches, &GeoConfig::standard());
        assert_eq!(cluster.kind, ClusterKind::NearPerfect);
        assert_eq!(cluster.len(), 1);
        assert_eq!(cluster.members[0].id, "anchor");
    }

    #[test]
    fn densest_group_beats_single_higher_match() {
        let matches = vec![
            at("lone", -33.8568, 151.2153, 0.9),
            at("p1", 48.8584, 2.2945, 0.85),
            at("p2", 48.8606, 2.3376, 0.84),
            at("p3", 48.8530, 2.3499, 0.83),
            at("p4", 48.8867, 2.3431, 0.82),
        ];
        let cluster = pick_consensus_cluster(&matches, &GeoConfig::standard());
        assert_eq!(cluster.kind, ClusterKind::Consensus);
        let ids: Vec<&str> = cluster.members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2", "p3", "p4"]);
    }

    #[test]
    fn near_anchor_seed_may_stand_alone() {
        let matches = vec![
            at("anchor", 35.6586, 139.7454, 0.97),
            at("far1", 51.5, -0.12, 0.5),
            at("far2", 40.7, -74.0, 0.4),
        ];
        let cluster = pick_consensus_cluster(&matches, &GeoConfig::standard());
        assert_eq!(cluster.kind, ClusterKind::NearAnchor);
        assert_eq!(cluster.members[0].id, "anchor");
    }

    #[test]
    fn scattered_matches_use_fallback_radius() {
        let matches = vec![
            at("a", 35.0, 139.0, 0.8),
            at("a-near", 35.05, 139.0, 0.7),
            at("b", 51.5, -0.12, 0.75),
            at("c", -33.9, 18.4, 0.6),
        ];
        let cluster = pick_consensus_cluster(&matches, &GeoConfig::standard());
        assert_eq!(cluster.kind, ClusterKind::FallbackRadius);
        assert!(cluster.is_size_exempt());
        let ids: Vec<&str> = cluster.members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "a-near"]);
    }

    #[test]
    fn cluster_is_truncated_to_max_by_similarity() {
        let matches: Vec<Match> = (0..12)
            .map(|i| at(&format!("m{i}"), 41.9 + i as f64 * 0.001, 12.5, 0.5 + i as f64 * 0.01))
            .collect();
        let config = GeoConfig::standard();
        let cluster = pick_consensus_cluster(&matches, &config);
        assert_eq!(cluster.len(), config.max_cluster_candidates);
        assert_eq!(cluster.members[0].id, "m11");
        assert!(cluster
            .members
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn empty_input_gives_empty_cluster() {
        assert!(pick_consensus_cluster(&[], &GeoConfig::standard()).is_empty());
    }

    #[test]
    fn remove_outliers_leaves_small_clusters_alone() {
        let cluster = vec![at("a", 0.0, 0.0, 0.5), at("b", 60.0, 60.0, 0.5), at("c", -60.0, 0.0, 0.5)];
        assert_eq!(remove_outliers(&cluster, 1.5), cluster);
    }

    #[test]
    fn remove_outliers_drops_far_member() {
        let mut cluster: Vec<Match> = (0..6)
            .map(|i| at(&format!("m{i}"), 45.0 + i as f64 * 0.01, 7.0, 0.7))
            .collect();
        cluster.push(at("stray", 45.2, 7.0, 0.7));
        let kept = remove_outliers(&cluster, 1.5);
        assert_eq!(kept.len(), 6);
        assert!(kept.iter().all(|m| m.id != "stray"));
    }

    #[test]
    fn quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile(&sorted, 0.75) - 3.25).abs() < 1e-12);
        assert_eq!(quantile(&[7.0], 0.75), 7.0);
    }

    #[test]
    fn weighted_median_is_not_the_mean() {
        let members: Vec<Match> = [10.0, 20.0, 30.0, 40.0]
            .iter()
            .map(|&lat| at("x", lat, 0.0, 0.8))
            .collect();
        let centroid = weighted_median_centroid(&members).unwrap();
        assert!(centroid.lat == 20.0 || centroid.lat == 30.0, "{}", centroid.lat);
        assert_ne!(centroid.lat, 25.0);
        assert_eq!(centroid.lon, 0.0);
    }

    #[test]
    fn weighted_median_resists_far_outlier() {
        let members = vec![
            at("a", 10.0, 10.0, 0.8),
            at("b", 10.1, 10.1, 0.8),
            at("c", 10.2, 10.2, 0.8),
            at("outlier", 80.0, 170.0, 0.8),
        ];
        let centroid = weighted_median_centroid(&members).unwrap();
        assert!(centroid.lat <= 10.2 && centroid.lon <= 10.2);
        assert!(weighted_median_centroid(&[]).is_none());
    }

    #[test]
    fn softmax_favors_higher_scores() {
        let members = vec![at("hi", 0.0, 0.0, 0.9), at("lo", 0.0, 0.0, 0.7)];
        let w = softmax_weights(&members);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(w[0] > 0.85);
    }

    #[test]
    fn spread_is_zero_for_colocated_members() {
        let members = vec![at("a", 37.8199, -122.4783, 0.9); 3];
        let centroid = weighted_median_centroid(&members).unwrap();
        assert_eq!(weighted_spread_m(&members, centroid), 0.0);
    }

    /// Four members within 60 m of each other plus one about 24 km north.
    fn tight_group_with_straggler() -> Vec<Match> {
        vec![
            at("a", 48.8500, 2.35, 0.90),
            at("b", 48.8505, 2.35, 0.89),
            at("c", 48.8510, 2.35, 0.88),
            at("d", 48.8515, 2.35, 0.87),
            at("far", 49.0700, 2.35, 0.86),
        ]
    }

    #[test]
    fn straggler_survives_when_outlier_rejection_is_off() {
        let config = GeoConfig {
            outlier_rejection: false,
            ..GeoConfig::standard()
        };
        let cluster = pick_consensus_cluster(&tight_group_with_straggler(), &config);
        assert_eq!(cluster.kind, ClusterKind::Consensus);
        assert_eq!(cluster.len(), 5);
        assert_eq!(cluster.outliers_removed, 0);
        assert!(cluster.members.iter().any(|m| m.id == "far"));
    }

    #[test]
    fn straggler_is_dropped_when_outlier_rejection_is_on() {
        let cluster = pick_consensus_cluster(&tight_group_with_straggler(), &GeoConfig::standard());
        assert_eq!(cluster.kind, ClusterKind::Consensus);
        assert_eq!(cluster.len(), 4);
        assert_eq!(cluster.outliers_removed, 1);
        assert!(cluster.members.iter().all(|m| m.id != "far"));
    }

    #[test]
    fn ultra_radius_reaches_a_group_forty_km_away() {
        // Second group sits 0.36 degrees (about 40 km) north of the first.
        let matches = vec![
            at("a1", 48.8500, 2.35, 0.90),
            at("a2", 48.8505, 2.35, 0.89),
            at("a3", 48.8510, 2.35, 0.88),
            at("b1", 49.2100, 2.35, 0.80),
            at("b2", 49.2105, 2.35, 0.79),
            at("b3", 49.2110, 2.35, 0.78),
        ];

        let standard = pick_consensus_cluster(&matches, &GeoConfig::standard());
        assert_eq!(standard.kind, ClusterKind::Consensus);
        let ids: Vec<&str> = standard.members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a1", "a2", "a3"]);

        let ultra = pick_consensus_cluster(&matches, &GeoConfig::ultra());
        assert_eq!(ultra.kind, ClusterKind::Consensus);
        assert_eq!(ultra.len(), 6);
        assert_eq!(ultra.outliers_removed, 0);
        assert!(ultra.members.iter().any(|m| m.id == "b3"));
    }

    #[test]
    fn three_member_group_meets_standard_minimum_only() {
        let matches = vec![
            at("p1", 48.8584, 2.2945, 0.90),
            at("p2", 48.8606, 2.3376, 0.89),
            at("p3", 48.8530, 2.3499, 0.88),
            at("syd", -33.8568, 151.2153, 0.85),
            at("tyo", 35.6762, 139.6503, 0.84),
        ];

        let standard = pick_consensus_cluster(&matches, &GeoConfig::standard());
        assert_eq!(standard.kind, ClusterKind::Consensus);
        assert_eq!(standard.len(), 3);

        let ultra = pick_consensus_cluster(&matches, &GeoConfig::ultra());
        assert_eq!(ultra.kind, ClusterKind::FallbackRadius);
        assert!(ultra.members.iter().all(|m| m.id.starts_with('p')));
    }
}
