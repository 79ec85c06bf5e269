//! Confidence calibration and uncertainty radius.
//!
//! ```text
//! confidence = clamp(0.1 + top×0.5 + margin×0.25 + strength×0.15 − penalty, floor, ceiling)
//!              × 0.5 if continent validation failed
//! radius_m   = clamp(r_floor + spread×(1.2 − confidence)×mult + (1 − strength)×30 000×mult,
//!                    r_floor, r_ceiling)
//! ```
//!
//! Bounds come from [`ScoringBounds`] for the active [`AccuracyMode`].

use crate::config::{AccuracyMode, ScoringBounds};
use crate::error::{GeoError, Result};
use serde::Serialize;
use std::fmt;

const BASE: f64 = 0.1;
const TOP_WEIGHT: f64 = 0.5;
const MARGIN_WEIGHT: f64 = 0.25;
const STRENGTH_WEIGHT: f64 = 0.15;
const CONTINENT_FAILURE_FACTOR: f64 = 0.5;
const CONSENSUS_RADIUS_M: f64 = 30_000.0;

/// Evidence fed to [`ConfidenceScorer::score`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInputs {
    /// Best match score on `[0, 1]`.
    pub top_score: f64,
    /// Runner-up score on `[0, 1]`, if there is one.
    pub second_score: Option<f64>,
    /// Cluster size relative to the search depth, on `[0, 1]`.
    pub consensus_strength: f64,
    pub spread_penalty: f64,
    pub continent_valid: bool,
}

impl ConfidenceInputs {
    /// `top − second`, floored at zero; zero without a runner-up.
    pub fn margin(&self) -> f64 {
        self.second_score
            .map_or(0.0, |second| (self.top_score - second).max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceScorer {
    bounds: ScoringBounds,
}

impl ConfidenceScorer {
    pub fn new(mode: AccuracyMode) -> Self {
        Self {
            bounds: mode.scoring_bounds(),
        }
    }

    pub fn with_bounds(bounds: ScoringBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &ScoringBounds {
        &self.bounds
    }

    /// Calibrated confidence. Non-finite inputs are an aggregation failure.
    pub fn score(&self, inputs: &ConfidenceInputs) -> Result<f64> {
        let margin = inputs.margin();
        for (name, value) in [
            ("top score", inputs.top_score),
            ("margin", margin),
            ("consensus strength", inputs.consensus_strength),
            ("spread penalty", inputs.spread_penalty),
        ] {
            if !value.is_finite() {
                return Err(GeoError::AggregationFailure(format!(
                    "non-finite {name} ({value})"
                )));
            }
        }

        let raw = BASE + inputs.top_score * TOP_WEIGHT + margin * MARGIN_WEIGHT
            + inputs.consensus_strength * STRENGTH_WEIGHT
            - inputs.spread_penalty;
        let mut confidence = raw.clamp(self.bounds.confidence_floor, self.bounds.confidence_ceiling);
        if !inputs.continent_valid {
            confidence *= CONTINENT_FAILURE_FACTOR;
        }
        Ok(confidence)
    }

    /// Uncertainty radius in meters; never smaller than the floor.
    pub fn radius_m(&self, confidence: f64, spread_m: f64, consensus_strength: f64) -> Result<f64> {
        let b = &self.bounds;
        let radius = b.radius_floor_m
            + spread_m * (1.2 - confidence) * b.radius_multiplier
            + (1.0 - consensus_strength) * CONSENSUS_RADIUS_M * b.radius_multiplier;
        if !radius.is_finite() {
            return Err(GeoError::AggregationFailure(format!(
                "non-finite radius (confidence {confidence}, spread {spread_m} m)"
            )));
        }
        Ok(radius.clamp(b.radius_floor_m, b.radius_ceiling_m))
    }
}

/// Three-tier label derived from a confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub const HIGH_THRESHOLD: f64 = 0.75;
    pub const MEDIUM_THRESHOLD: f64 = 0.60;

    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= Self::HIGH_THRESHOLD {
            ConfidenceTier::High
        } else if confidence >= Self::MEDIUM_THRESHOLD {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
