//! Visibility gate: decide whether a computed location may be disclosed.
//!
//! The gate is a pure decision function. It can withhold a numerically
//! acceptable estimate when the top matches disagree geographically, and it can
//! release a borderline-low estimate when the top matches strongly agree.
//!
//! Withhold reasons are checked in a fixed order and the first hit is reported:
//! fallback embedding, then wide radius, then weak consensus, then low confidence.

use crate::catalog::Match;
use crate::config::GeoConfig;
use crate::geo::haversine_m;
use serde::Serialize;
use std::fmt;

/// Number of top matches inspected for consensus.
pub const CONSENSUS_TOP_K: usize = 5;
/// Matches this close to the top match count as the same spot.
pub const SAME_SPOT_RADIUS_M: f64 = 1_500.0;
/// Matches this close to the top match count as nearby.
pub const NEARBY_RADIUS_M: f64 = 25_000.0;
const CONSENSUS_MIN_COUNT: usize = 3;

/// Agreement among the top-K matches, independent of any confidence score.
///
/// Counts include the top match itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MatchConsensus {
    pub same_spot_matches: usize,
    pub nearby_matches: usize,
    pub same_label_matches: usize,
    pub strong_consensus: bool,
    pub actionable_coherence: bool,
}

/// Analyze the first `k` of `matches` (ranked, most similar first) against the top one.
pub fn analyze_match_consensus(matches: &[Match], k: usize) -> MatchConsensus {
    let Some(top) = matches.first() else {
        return MatchConsensus::default();
    };
    let top_label = normalize_label(&top.label);

    let mut consensus = MatchConsensus::default();
    for m in matches.iter().take(k) {
        let distance = haversine_m(top.lat, top.lon, m.lat, m.lon);
        if distance <= SAME_SPOT_RADIUS_M {
            consensus.same_spot_matches += 1;
        }
        if distance <= NEARBY_RADIUS_M {
            consensus.nearby_matches += 1;
        }
        if !top_label.is_empty() && normalize_label(&m.label) == top_label {
            consensus.same_label_matches += 1;
        }
    }

    consensus.strong_consensus = consensus.same_spot_matches >= CONSENSUS_MIN_COUNT
        || (consensus.same_label_matches >= CONSENSUS_MIN_COUNT
            && consensus.nearby_matches >= CONSENSUS_MIN_COUNT);
    consensus.actionable_coherence =
        consensus.strong_consensus || consensus.nearby_matches >= CONSENSUS_MIN_COUNT;
    consensus
}

/// Case- and punctuation-insensitive form of a landmark label.
pub fn normalize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Why a location was withheld. Serialized as the snake_case reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithholdReason {
    ModelFallbackActive,
    CandidateSpreadTooWide,
    MatchConsensusWeak,
    ConfidenceBelowActionableThreshold,
}

impl WithholdReason {
    pub fn as_str(self) -> &'static str {
        match self {
            WithholdReason::ModelFallbackActive => "model_fallback_active",
            WithholdReason::CandidateSpreadTooWide => "candidate_spread_too_wide",
            WithholdReason::MatchConsensusWeak => "match_consensus_weak",
            WithholdReason::ConfidenceBelowActionableThreshold => {
                "confidence_below_actionable_threshold"
            }
        }
    }
}

impl fmt::Display for WithholdReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline conditions reported by the caller.
///
/// The two fallback flags are independent: a fallback embedding model withholds
/// the location, while a CLIP fallback path suppresses withholding entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GateFlags {
    pub uses_fallback_embedding: bool,
    pub uses_clip_fallback: bool,
    pub is_wide_radius: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VisibilityDecision {
    pub should_withhold_location: bool,
    /// Set only when the location is withheld.
    pub reason: Option<WithholdReason>,
    pub low_confidence: bool,
    pub weak_consensus: bool,
    pub match_consensus: MatchConsensus,
}

/// Decide whether to disclose a location.
///
/// `matches` are the ranked ANN matches; only the first [`CONSENSUS_TOP_K`] are
/// inspected. Always returns a decision. A NaN confidence counts as low.
pub fn decide_location_visibility(
    confidence: f64,
    matches: &[Match],
    flags: GateFlags,
    minimum_confidence: f64,
) -> VisibilityDecision {
    let match_consensus = analyze_match_consensus(matches, CONSENSUS_TOP_K);
    let below_threshold = confidence.is_nan() || confidence < minimum_confidence;
    let low_confidence = below_threshold && !match_consensus.strong_consensus;
    let weak_consensus = !match_consensus.actionable_coherence;

    let reason = if flags.uses_clip_fallback {
        None
    } else if flags.uses_fallback_embedding {
        Some(WithholdReason::ModelFallbackActive)
    } else if flags.is_wide_radius {
        Some(WithholdReason::CandidateSpreadTooWide)
    } else if weak_consensus {
        Some(WithholdReason::MatchConsensusWeak)
    } else if low_confidence {
        Some(WithholdReason::ConfidenceBelowActionableThreshold)
    } else {
        None
    };

    if let Some(reason) = reason {
        tracing::debug!(%reason, confidence, "withholding location");
    }

    VisibilityDecision {
        should_withhold_location: reason.is_some(),
        reason,
        low_confidence,
        weak_consensus,
        match_consensus,
    }
}

/// True when `radius_m` exceeds the configured disclosure threshold.
pub fn is_wide_radius(radius_m: f64, config: &GeoConfig) -> bool {
    radius_m.is_nan() || radius_m > config.wide_radius_threshold_m
}
