//! Match aggregation: ranked matches in, one scored location out.
//!
//! Stages, in order: dominant-continent filter, consensus clustering,
//! weighted-median centroid and spread, continent consistency check, and
//! confidence / radius calibration. Integrity problems (no matches, non-finite
//! coordinates) are errors; weak evidence only lowers the confidence.

use crate::catalog::{valid_coordinate, Match};
use crate::confidence::{ConfidenceInputs, ConfidenceScorer};
use crate::config::GeoConfig;
use crate::consensus::{
    pick_consensus_cluster, weighted_median_centroid, weighted_spread_m, ClusterKind,
};
use crate::error::{GeoError, Result};
use crate::geo::{
    calculate_geographic_spread_penalty, filter_to_dominant_continent, get_dominant_continent,
    validate_continent_consistency, Continent, ContinentValidation,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    /// Uncertainty radius around `(lat, lon)`.
    pub radius_m: f64,
}

/// Intermediate values behind an [`AggregatedResult`], for logging and debugging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationDiagnostics {
    pub input_matches: usize,
    /// Matches left after the dominant-continent filter.
    pub filtered_matches: usize,
    pub dominant_continent: Option<Continent>,
    pub cluster_kind: ClusterKind,
    pub cluster_size: usize,
    pub outliers_removed: usize,
    pub spread_m: f64,
    pub spread_penalty: f64,
    pub consensus_strength: f64,
    pub continent_validation: ContinentValidation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub location: Location,
    pub confidence: f64,
    /// The consensus cluster the location was computed from, most similar first.
    pub candidates: Vec<Match>,
    pub diagnostics: AggregationDiagnostics,
}

/// Aggregate ranked `matches` into a single location estimate.
///
/// # Errors
///
/// - [`GeoError::AggregationFailure`] for an empty input, a match with
///   non-finite coordinates, an empty cluster, or non-finite scores.
/// - [`GeoError::InvalidCoordinates`] when the centroid is non-finite or out of range.
pub fn aggregate_matches(matches: &[Match], config: &GeoConfig) -> Result<AggregatedResult> {
    if matches.is_empty() {
        return Err(GeoError::AggregationFailure("no matches to aggregate".to_string()));
    }
    if let Some(bad) = matches.iter().find(|m| !m.has_finite_coordinates()) {
        return Err(GeoError::AggregationFailure(format!(
            "match {} has non-finite coordinates ({}, {})",
            bad.id, bad.lat, bad.lon
        )));
    }

    let mut filtered = filter_to_dominant_continent(matches);
    filtered.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    let cluster = pick_consensus_cluster(&filtered, config);
    if cluster.is_empty() {
        return Err(GeoError::AggregationFailure(
            "consensus clustering produced no candidates".to_string(),
        ));
    }

    let centroid = weighted_median_centroid(&cluster.members).ok_or_else(|| {
        GeoError::AggregationFailure("consensus cluster has no centroid".to_string())
    })?;
    if !valid_coordinate(centroid.lat, centroid.lon) {
        return Err(GeoError::InvalidCoordinates {
            lat: centroid.lat,
            lon: centroid.lon,
        });
    }

    let spread_m = weighted_spread_m(&cluster.members, centroid);
    let spread_penalty = calculate_geographic_spread_penalty(&cluster.members);
    let continent_validation = validate_continent_consistency(centroid.lat, centroid.lon, matches);

    let available = config.search_depth.min(filtered.len()).max(1);
    let consensus_strength = (cluster.len() as f64 / available as f64).min(1.0);

    let scorer = ConfidenceScorer::new(config.mode);
    let inputs = ConfidenceInputs {
        top_score: filtered[0].score(),
        second_score: filtered.get(1).map(Match::score),
        consensus_strength,
        spread_penalty,
        continent_valid: continent_validation.is_valid,
    };
    let confidence = scorer.score(&inputs)?;
    let radius_m = scorer.radius_m(confidence, spread_m, consensus_strength)?;

    if let Some(continent) = continent_validation.predicted {
        if !continent.zone().is_plausible(centroid.lat, centroid.lon) {
            tracing::warn!(
                lat = centroid.lat,
                lon = centroid.lon,
                %continent,
                "centroid lies outside the plausible radius of its continent"
            );
        }
    }
    if let Some(reason) = &continent_validation.reason {
        tracing::debug!(reason = %reason, "continent consistency check failed");
    }

    let diagnostics = AggregationDiagnostics {
        input_matches: matches.len(),
        filtered_matches: filtered.len(),
        dominant_continent: get_dominant_continent(matches),
        cluster_kind: cluster.kind,
        cluster_size: cluster.len(),
        outliers_removed: cluster.outliers_removed,
        spread_m,
        spread_penalty,
        consensus_strength,
        continent_validation,
    };
    tracing::debug!(
        lat = centroid.lat,
        lon = centroid.lon,
        radius_m,
        confidence,
        cluster = diagnostics.cluster_size,
        kind = ?diagnostics.cluster_kind,
        "aggregated matches"
    );

    Ok(AggregatedResult {
        location: Location {
            lat: centroid.lat,
            lon: centroid.lon,
            radius_m,
        },
        confidence,
        candidates: cluster.members,
        diagnostics,
    })
}
