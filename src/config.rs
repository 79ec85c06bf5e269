//! Engine configuration.
//!
//! One [`GeoConfig`] is built at startup and passed by reference into every
//! stage; no stage reads the environment on its own. The ultra-accuracy mode is
//! a preset ([`GeoConfig::ultra`]) rather than scattered conditionals.
//!
//! # Environment overrides
//!
//! | Variable | Field | Standard / ultra default | Clamp |
//! |----------|-------|--------------------------|-------|
//! | `GEO_ULTRA_ACCURACY` | `mode` | `false` | bool |
//! | `GEO_CLUSTER_RADIUS_M` | `cluster_radius_m` | 30 000 / 50 000 | 1 000 ..= 200 000 |
//! | `GEO_MIN_CLUSTER_CANDIDATES` | `min_cluster_candidates` | 3 / 4 | 1 ..= 10 |
//! | `GEO_MAX_CLUSTER_CANDIDATES` | `max_cluster_candidates` | 6 / 8 | min ..= 32 |
//! | `GEO_CLUSTER_SEARCH_DEPTH` | `search_depth` | 24 / 32 | 5 ..= 256 |
//! | `GEO_OUTLIER_REJECTION` | `outlier_rejection` | `true` | bool |
//! | `GEO_IQR_MULTIPLIER` | `iqr_multiplier` | 1.5 | 0.5 ..= 5.0 |
//! | `GEO_MIN_CONFIDENCE` | `minimum_confidence` | 0.65 | 0.0 ..= 1.0 |
//! | `GEO_WIDE_RADIUS_M` | `wide_radius_threshold_m` | 250 000 | 1 000 ..= 5 000 000 |
//!
//! Unparseable values are ignored with a warning; out-of-range values are clamped.

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyMode {
    #[default]
    Standard,
    /// Larger shortlist and clusters, narrower confidence bounds, tighter radii.
    Ultra,
}

/// Confidence and radius bounds implied by an [`AccuracyMode`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringBounds {
    pub confidence_floor: f64,
    pub confidence_ceiling: f64,
    pub radius_floor_m: f64,
    pub radius_multiplier: f64,
    pub radius_ceiling_m: f64,
}

impl AccuracyMode {
    pub fn scoring_bounds(self) -> ScoringBounds {
        match self {
            AccuracyMode::Standard => ScoringBounds {
                confidence_floor: 0.05,
                confidence_ceiling: 0.97,
                radius_floor_m: 100.0,
                radius_multiplier: 1.0,
                radius_ceiling_m: 2_000_000.0,
            },
            AccuracyMode::Ultra => ScoringBounds {
                confidence_floor: 0.15,
                confidence_ceiling: 0.95,
                radius_floor_m: 80.0,
                radius_multiplier: 0.7,
                radius_ceiling_m: 500_000.0,
            },
        }
    }
}

/// Tunables for clustering, scoring and gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoConfig {
    pub mode: AccuracyMode,
    /// Radius around each seed within which matches join its cluster.
    pub cluster_radius_m: f64,
    pub min_cluster_candidates: usize,
    pub max_cluster_candidates: usize,
    /// Number of top matches considered by clustering.
    pub search_depth: usize,
    pub outlier_rejection: bool,
    /// `k` in the IQR fence `Q3 + k * (Q3 - Q1)`.
    pub iqr_multiplier: f64,
    /// Starting threshold for the visibility gate; strong consensus may override it.
    pub minimum_confidence: f64,
    /// Uncertainty radius above which a location counts as too spread to disclose.
    pub wide_radius_threshold_m: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self::standard()
    }
}

const CLUSTER_RADIUS_RANGE: (f64, f64) = (1_000.0, 200_000.0);
const MIN_CANDIDATES_RANGE: (usize, usize) = (1, 10);
const MAX_CANDIDATES_CAP: usize = 32;
const SEARCH_DEPTH_RANGE: (usize, usize) = (5, 256);
const IQR_RANGE: (f64, f64) = (0.5, 5.0);
const MIN_CONFIDENCE_RANGE: (f64, f64) = (0.0, 1.0);
const WIDE_RADIUS_RANGE: (f64, f64) = (1_000.0, 5_000_000.0);

impl GeoConfig {
    pub fn standard() -> Self {
        Self {
            mode: AccuracyMode::Standard,
            cluster_radius_m: 30_000.0,
            min_cluster_candidates: 3,
            max_cluster_candidates: 6,
            search_depth: 24,
            outlier_rejection: true,
            iqr_multiplier: 1.5,
            minimum_confidence: 0.65,
            wide_radius_threshold_m: 250_000.0,
        }
    }

    pub fn ultra() -> Self {
        Self {
            mode: AccuracyMode::Ultra,
            cluster_radius_m: 50_000.0,
            min_cluster_candidates: 4,
            max_cluster_candidates: 8,
            search_depth: 32,
            ..Self::standard()
        }
    }

    pub fn for_mode(mode: AccuracyMode) -> Self {
        match mode {
            AccuracyMode::Standard => Self::standard(),
            AccuracyMode::Ultra => Self::ultra(),
        }
    }

    pub fn is_ultra(&self) -> bool {
        self.mode == AccuracyMode::Ultra
    }

    pub fn scoring_bounds(&self) -> ScoringBounds {
        self.mode.scoring_bounds()
    }

    /// Build from the process environment. See the module docs for variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Apply process-environment overrides on top of `self`, keeping its mode.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, a map in tests, ...).
    ///
    /// `GEO_ULTRA_ACCURACY` selects the preset; the remaining variables then
    /// override individual fields, and the result is clamped.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let ultra = lookup("GEO_ULTRA_ACCURACY")
            .and_then(|raw| parse_bool("GEO_ULTRA_ACCURACY", &raw))
            .unwrap_or(false);
        let base = if ultra { Self::ultra() } else { Self::standard() };
        base.with_overrides(lookup)
    }

    /// Apply per-field overrides from `lookup` on top of `self`, then clamp.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<f64>(&lookup, "GEO_CLUSTER_RADIUS_M") {
            self.cluster_radius_m = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "GEO_MIN_CLUSTER_CANDIDATES") {
            self.min_cluster_candidates = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "GEO_MAX_CLUSTER_CANDIDATES") {
            self.max_cluster_candidates = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "GEO_CLUSTER_SEARCH_DEPTH") {
            self.search_depth = v;
        }
        if let Some(raw) = lookup("GEO_OUTLIER_REJECTION") {
            if let Some(b) = parse_bool("GEO_OUTLIER_REJECTION", &raw) {
                self.outlier_rejection = b;
            }
        }
        if let Some(v) = parse_var::<f64>(&lookup, "GEO_IQR_MULTIPLIER") {
            self.iqr_multiplier = v;
        }
        if let Some(v) = parse_var::<f64>(&lookup, "GEO_MIN_CONFIDENCE") {
            self.minimum_confidence = v;
        }
        if let Some(v) = parse_var::<f64>(&lookup, "GEO_WIDE_RADIUS_M") {
            self.wide_radius_threshold_m = v;
        }
        self.clamped()
    }

    /// Force every knob into its documented range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.cluster_radius_m = clamp_f64(
            "cluster_radius_m",
            self.cluster_radius_m,
            CLUSTER_RADIUS_RANGE,
            Self::for_mode(self.mode).cluster_radius_m,
        );
        self.min_cluster_candidates = clamp_usize(
            "min_cluster_candidates",
            self.min_cluster_candidates,
            MIN_CANDIDATES_RANGE,
        );
        self.max_cluster_candidates = clamp_usize(
            "max_cluster_candidates",
            self.max_cluster_candidates,
            (self.min_cluster_candidates, MAX_CANDIDATES_CAP),
        );
        self.search_depth = clamp_usize("search_depth", self.search_depth, SEARCH_DEPTH_RANGE);
        self.iqr_multiplier = clamp_f64("iqr_multiplier", self.iqr_multiplier, IQR_RANGE, 1.5);
        self.minimum_confidence = clamp_f64(
            "minimum_confidence",
            self.minimum_confidence,
            MIN_CONFIDENCE_RANGE,
            0.65,
        );
        self.wide_radius_threshold_m = clamp_f64(
            "wide_radius_threshold_m",
            self.wide_radius_threshold_m,
            WIDE_RADIUS_RANGE,
            250_000.0,
        );
        self
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable configuration override");
            None
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring unparseable boolean override");
            None
        }
    }
}

fn clamp_f64(field: &str, value: f64, (min, max): (f64, f64), fallback: f64) -> f64 {
    if !value.is_finite() {
        tracing::warn!(field, value, fallback, "non-finite configuration value replaced");
        return fallback;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::debug!(field, value, clamped, "configuration value clamped");
    }
    clamped
}

fn clamp_usize(field: &str, value: usize, (min, max): (usize, usize)) -> usize {
    let clamped = value.clamp(min, max.max(min));
    if clamped != value {
        tracing::debug!(field, value, clamped, "configuration value clamped");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn presets_match_documented_defaults() {
        let standard = GeoConfig::standard();
        assert_eq!(standard.cluster_radius_m, 30_000.0);
        assert_eq!(
            (standard.min_cluster_candidates, standard.max_cluster_candidates),
            (3, 6)
        );
        assert_eq!(standard.search_depth, 24);
        assert_eq!(standard.minimum_confidence, 0.65);

        let ultra = GeoConfig::ultra();
        assert!(ultra.is_ultra());
        assert_eq!((ultra.min_cluster_candidates, ultra.max_cluster_candidates), (4, 8));
        assert_eq!(ultra.search_depth, 32);
        assert_eq!(ultra.scoring_bounds().confidence_floor, 0.15);
    }

    #[test]
    fn empty_environment_is_standard() {
        assert_eq!(GeoConfig::from_lookup(|_| None), GeoConfig::standard());
    }

    #[test]
    fn overrides_apply_on_top_of_selected_preset() {
        let config = GeoConfig::from_lookup(lookup(&[
            ("GEO_ULTRA_ACCURACY", "true"),
            ("GEO_CLUSTER_SEARCH_DEPTH", "40"),
            ("GEO_OUTLIER_REJECTION", "off"),
            ("GEO_MIN_CONFIDENCE", "0.7"),
        ]));
        assert_eq!(config.mode, AccuracyMode::Ultra);
        assert_eq!(config.search_depth, 40);
        assert!(!config.outlier_rejection);
        assert_eq!(config.minimum_confidence, 0.7);
        assert_eq!(config.min_cluster_candidates, 4);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = GeoConfig::from_lookup(lookup(&[
            ("GEO_CLUSTER_RADIUS_M", "5"),
            ("GEO_MIN_CLUSTER_CANDIDATES", "7"),
            ("GEO_MAX_CLUSTER_CANDIDATES", "2"),
            ("GEO_CLUSTER_SEARCH_DEPTH", "100000"),
            ("GEO_IQR_MULTIPLIER", "NaN"),
            ("GEO_MIN_CONFIDENCE", "1.5"),
        ]));
        assert_eq!(config.cluster_radius_m, 1_000.0);
        assert_eq!(config.min_cluster_candidates, 7);
        assert_eq!(config.max_cluster_candidates, 7);
        assert_eq!(config.search_depth, 256);
        assert_eq!(config.iqr_multiplier, 1.5);
        assert_eq!(config.minimum_confidence, 1.0);
    }

    #[test]
    fn garbage_values_are_ignored() {
        let config = GeoConfig::from_lookup(lookup(&[
            ("GEO_ULTRA_ACCURACY", "maybe"),
            ("GEO_CLUSTER_SEARCH_DEPTH", "lots"),
        ]));
        assert_eq!(config, GeoConfig::standard());
    }
}
