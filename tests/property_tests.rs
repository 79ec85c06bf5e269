//! Property-based tests for the geolocation pipeline.
//!
//! These check invariants that should hold regardless of input:
//! - Index similarities stay within [-1, 1]
//! - Outlier rejection never touches clusters smaller than four
//! - The dominant-continent filter never starves clustering
//! - The visibility gate is a pure function
//! - Aggregated coordinates are in range and the radius is bounded

use geolocus::confidence::ConfidenceScorer;
use geolocus::geo::{filter_to_dominant_continent, haversine_m};
use geolocus::{
    aggregate_matches, decide_location_visibility, remove_outliers, AccuracyMode, ClusterKind,
    GateFlags, GeoConfig, GeoIndex, HNSWParams, Match, ReferenceRecord,
};
use proptest::prelude::*;

prop_compose! {
    fn arb_match()(
        lat in -89.0f64..89.0,
        lon in -179.0f64..179.0,
        similarity in -1.0f64..=1.0,
        label in prop::sample::select(vec!["Eiffel Tower", "eiffel tower!", "Big Ben", ""]),
    ) -> Match {
        Match::new(format!("{lat:.3},{lon:.3}"), label, lat, lon, similarity)
    }
}

prop_compose! {
    fn arb_vector(dim: usize)(v in prop::collection::vec(-10.0f32..10.0, dim)) -> Vec<f32> {
        v
    }
}

fn arb_flags() -> impl Strategy<Value = GateFlags> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(a, b, c)| GateFlags {
        uses_fallback_embedding: a,
        uses_clip_fallback: b,
        is_wide_radius: c,
    })
}

fn is_nonzero(v: &[f32]) -> bool {
    v.iter().any(|x| x.abs() > 1e-3)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn index_similarity_in_range(
        vectors in prop::collection::vec(arb_vector(8), 1..40),
        query in arb_vector(8),
        k in 1usize..50,
    ) {
        prop_assume!(vectors.iter().all(|v| is_nonzero(v)) && is_nonzero(&query));
        let records: Vec<ReferenceRecord> = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| ReferenceRecord::new(format!("r{i}"), "", 0.0, 0.0, v))
            .collect();
        let n = records.len();
        let index = GeoIndex::build_from(8, HNSWParams::default(), records).unwrap();
        let matches = index.search(&query, k).unwrap();
        prop_assert!(matches.len() <= k.min(n));
        for m in &matches {
            prop_assert!((-1.0..=1.0).contains(&m.similarity), "{}", m.similarity);
        }
        for w in matches.windows(2) {
            prop_assert!(w[0].similarity >= w[1].similarity);
        }
    }

    #[test]
    fn remove_outliers_identity_below_four(
        cluster in prop::collection::vec(arb_match(), 0..4),
        multiplier in 0.5f64..5.0,
    ) {
        prop_assert_eq!(remove_outliers(&cluster, multiplier), cluster);
    }

    #[test]
    fn remove_outliers_only_removes(
        cluster in prop::collection::vec(arb_match(), 4..20),
    ) {
        let kept = remove_outliers(&cluster, 1.5);
        prop_assert!(!kept.is_empty());
        prop_assert!(kept.len() <= cluster.len());
        prop_assert!(kept.iter().all(|m| cluster.contains(m)));
    }

    #[test]
    fn dominant_filter_never_starves(matches in prop::collection::vec(arb_match(), 3..25)) {
        let filtered = filter_to_dominant_continent(&matches);
        prop_assert!(filtered.len() >= 3);
        prop_assert!(filtered.iter().all(|m| matches.contains(m)));
    }

    #[test]
    fn visibility_gate_is_pure(
        matches in prop::collection::vec(arb_match(), 0..10),
        confidence in 0.0f64..1.0,
        minimum in 0.0f64..1.0,
        flags in arb_flags(),
    ) {
        let first = decide_location_visibility(confidence, &matches, flags, minimum);
        let second = decide_location_visibility(confidence, &matches, flags, minimum);
        prop_assert_eq!(first, second);
        prop_assert_eq!(first.should_withhold_location, first.reason.is_some());
        if flags.uses_clip_fallback {
            prop_assert!(!first.should_withhold_location);
        }
    }

    #[test]
    fn aggregation_output_is_well_formed(
        matches in prop::collection::vec(arb_match(), 1..30),
        ultra in any::<bool>(),
    ) {
        let config = if ultra { GeoConfig::ultra() } else { GeoConfig::standard() };
        let bounds = config.scoring_bounds();
        let result = aggregate_matches(&matches, &config).unwrap();
        let loc = result.location;
        prop_assert!((-90.0..=90.0).contains(&loc.lat));
        prop_assert!((-180.0..=180.0).contains(&loc.lon));
        prop_assert!(loc.radius_m >= bounds.radius_floor_m);
        prop_assert!(loc.radius_m <= bounds.radius_ceiling_m);
        prop_assert!(result.confidence.is_finite());
        prop_assert!(result.confidence <= bounds.confidence_ceiling);
        prop_assert!(!result.candidates.is_empty());
        prop_assert!(result.candidates.len() <= config.max_cluster_candidates);
        if result.diagnostics.cluster_kind == ClusterKind::Consensus {
            prop_assert!(result.candidates.len() >= config.min_cluster_candidates);
        }
    }

    #[test]
    fn radius_monotone_in_confidence(
        a in 0.0f64..1.0,
        b in 0.0f64..1.0,
        spread in 0.0f64..1e6,
        strength in 0.0f64..=1.0,
    ) {
        let scorer = ConfidenceScorer::new(AccuracyMode::Standard);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let r_lo = scorer.radius_m(lo, spread, strength).unwrap();
        let r_hi = scorer.radius_m(hi, spread, strength).unwrap();
        prop_assert!(r_lo >= r_hi);
    }

    #[test]
    fn haversine_symmetric_and_bounded(
        a in arb_match(),
        b in arb_match(),
    ) {
        let ab = haversine_m(a.lat, a.lon, b.lat, b.lon);
        let ba = haversine_m(b.lat, b.lon, a.lat, a.lon);
        prop_assert!((ab - ba).abs() < 1e-6);
        prop_assert!(ab >= 0.0 && ab <= std::f64::consts::PI * 6_371_000.0 + 1.0);
    }
}
