//! End-to-end estimate: query embedding in, gated location out.

use crate::aggregate::{aggregate_matches, AggregatedResult, Location};
use crate::catalog::Match;
use crate::confidence::ConfidenceTier;
use crate::config::GeoConfig;
use crate::error::Result;
use crate::index::GeoIndex;
use crate::visibility::{
    decide_location_visibility, is_wide_radius, GateFlags, VisibilityDecision, CONSENSUS_TOP_K,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationEstimate {
    pub result: AggregatedResult,
    pub visibility: VisibilityDecision,
    pub tier: ConfidenceTier,
    /// Ranked ANN matches the estimate was derived from.
    pub matches: Vec<Match>,
}

impl LocationEstimate {
    /// The location, unless the gate withheld it.
    pub fn disclosed_location(&self) -> Option<Location> {
        (!self.visibility.should_withhold_location).then_some(self.result.location)
    }
}

/// Runs search, aggregation and gating with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Geolocator {
    config: GeoConfig,
}

impl Geolocator {
    pub fn new(config: GeoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeoConfig {
        &self.config
    }

    /// Number of neighbors requested from the index per query.
    pub fn k(&self) -> usize {
        self.config.search_depth.max(CONSENSUS_TOP_K)
    }

    /// Estimate a location for `query`.
    ///
    /// `flags.is_wide_radius` is combined with the configured wide-radius
    /// threshold applied to the computed radius. Index and aggregation errors
    /// propagate unchanged.
    pub fn locate(
        &self,
        index: &GeoIndex,
        query: &[f32],
        flags: GateFlags,
    ) -> Result<LocationEstimate> {
        let matches = index.search(query, self.k())?;
        self.locate_matches(matches, flags)
    }

    /// [`locate`](Self::locate) for matches obtained elsewhere, ranked best first.
    pub fn locate_matches(&self, matches: Vec<Match>, flags: GateFlags) -> Result<LocationEstimate> {
        let result = aggregate_matches(&matches, &self.config)?;
        let flags = GateFlags {
            is_wide_radius: flags.is_wide_radius
                || is_wide_radius(result.location.radius_m, &self.config),
            ..flags
        };
        let visibility = decide_location_visibility(
            result.confidence,
            &matches,
            flags,
            self.config.minimum_confidence,
        );
        let tier = ConfidenceTier::from_confidence(result.confidence);
        tracing::debug!(
            confidence = result.confidence,
            %tier,
            withheld = visibility.should_withhold_location,
            "location estimate"
        );

        Ok(LocationEstimate {
            result,
            visibility,
            tier,
            matches,
        })
    }
}
