//! Acceptance scenarios for the consensus pipeline, through the public API.

use geolocus::consensus::weighted_median_centroid;
use geolocus::{
    aggregate_matches, decide_location_visibility, pick_consensus_cluster, ClusterKind,
    GateFlags, GeoConfig, GeoError, GeoIndex, Geolocator, HNSWParams, Match, ReferenceRecord,
    WithholdReason,
};

/// Unit embedding at `deg` degrees from the query axis in the first plane.
fn at_angle(deg: f32) -> Vec<f32> {
    let r = deg.to_radians();
    vec![r.cos(), r.sin(), 0.0]
}

fn golden_gate_matches() -> Vec<Match> {
    (0..5)
        .map(|i| Match::new(format!("gg-{i}"), "Golden Gate Bridge", 37.8199, -122.4783, 1.0))
        .collect()
}

fn cross_continent_confusers() -> Vec<Match> {
    vec![
        Match::new("eiffel", "Eiffel Tower", 48.8584, 2.2945, 0.75),
        Match::new("tokyo-tower", "Tokyo Tower", 35.6586, 139.7454, 0.68),
        Match::new("eiffel-vegas", "Paris Las Vegas", 36.1125, -115.1707, 0.61),
        Match::new("rio", "Cristo Redentor", -22.9519, -43.2105, 0.55),
        Match::new("sydney", "Sydney Tower", -33.8705, 151.2089, 0.49),
    ]
}

#[test]
fn scenario_a_strong_consensus_overrides_low_confidence() {
    let decision =
        decide_location_visibility(0.601, &golden_gate_matches(), GateFlags::default(), 0.605);
    assert!(!decision.should_withhold_location);
    assert!(decision.match_consensus.strong_consensus);
    assert!(!decision.low_confidence);
    assert_eq!(decision.reason, None);
}

#[test]
fn scenario_b_scattered_confusers_are_withheld() {
    let decision = decide_location_visibility(
        0.722,
        &cross_continent_confusers(),
        GateFlags::default(),
        0.65,
    );
    assert!(!decision.match_consensus.actionable_coherence);
    assert!(decision.should_withhold_location);
    assert_eq!(decision.reason, Some(WithholdReason::MatchConsensusWeak));
    assert_eq!(
        decision.reason.map(WithholdReason::as_str),
        Some("match_consensus_weak")
    );
}

#[test]
fn scenario_c_near_perfect_anchor_bypasses_cluster_size() {
    let mut matches = vec![Match::new("anchor", "Sagrada Familia", 41.4036, 2.1744, 0.995)];
    // Nineteen strong matches clustered elsewhere must not outvote the anchor.
    for i in 0..19 {
        matches.push(Match::new(
            format!("madrid-{i}"),
            "Puerta del Sol",
            40.4169 + i as f64 * 0.0005,
            -3.7035,
            0.93,
        ));
    }
    for config in [GeoConfig::standard(), GeoConfig::ultra()] {
        let cluster = pick_consensus_cluster(&matches, &config);
        assert_eq!(cluster.kind, ClusterKind::NearPerfect);
        assert_eq!(cluster.len(), 1);
        assert_eq!(cluster.members[0].id, "anchor");
    }
}

#[test]
fn scenario_d_empty_catalog_is_an_error() {
    let mut index = GeoIndex::new(4, HNSWParams::default()).unwrap();
    assert!(matches!(index.build(Vec::new()), Err(GeoError::EmptyCatalog)));
    assert!(matches!(
        index.search(&[1.0, 0.0, 0.0, 0.0], 5),
        Err(GeoError::IndexNotBuilt)
    ));
    assert!(!index.ready());
    assert_eq!(index.size(), 0);
}

#[test]
fn scenario_e_weighted_median_not_mean() {
    let members: Vec<Match> = [10.0, 20.0, 30.0, 40.0]
        .iter()
        .map(|&lat| Match::new("p", "", lat, 5.0, 0.8))
        .collect();
    let centroid = weighted_median_centroid(&members).unwrap();
    assert!([20.0, 30.0].contains(&centroid.lat), "{}", centroid.lat);
    assert_ne!(centroid.lat, 25.0);
}

#[test]
fn confuser_outvoted_end_to_end() {
    // Four views of the Paris tower and one of the Las Vegas replica, which
    // embeds closest to the query.
    let mut records = vec![ReferenceRecord::new(
        "vegas",
        "Eiffel Tower",
        36.1125,
        -115.1707,
        at_angle(10.0),
    )];
    for i in 0..4 {
        records.push(ReferenceRecord::new(
            format!("paris-{i}"),
            "Eiffel Tower",
            48.8584 + i as f64 * 0.001,
            2.2945,
            at_angle(12.0 + i as f32),
        ));
    }
    records.push(ReferenceRecord::new(
        "unrelated",
        "Harbour Bridge",
        -33.8523,
        151.2108,
        vec![0.0, 0.0, 1.0],
    ));
    let index = GeoIndex::build_from(3, HNSWParams::default(), records).unwrap();

    let estimate = Geolocator::new(GeoConfig::standard())
        .locate(&index, &[1.0, 0.0, 0.0], GateFlags::default())
        .unwrap();
    assert_eq!(estimate.matches[0].id, "vegas");
    let location = estimate.result.location;
    assert!((location.lat - 48.86).abs() < 0.01, "{location:?}");
    assert!((location.lon - 2.2945).abs() < 1e-9);
    assert!(estimate
        .result
        .candidates
        .iter()
        .all(|m| m.id.starts_with("paris-")));
}

#[test]
fn aggregation_never_returns_empty_silently() {
    assert!(matches!(
        aggregate_matches(&[], &GeoConfig::standard()),
        Err(GeoError::AggregationFailure(_))
    ));
    let corrupt = vec![Match::new("x", "", f64::INFINITY, 0.0, 0.9)];
    assert!(matches!(
        aggregate_matches(&corrupt, &GeoConfig::standard()),
        Err(GeoError::AggregationFailure(_))
    ));
}
