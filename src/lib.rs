//! geolocus: geolocation consensus over reference embeddings.
//!
//! Given a query image embedding, find the most similar reference photos in a
//! geotagged catalog and turn those noisy, sometimes contradictory matches into
//! one location estimate plus a decision on whether to disclose it.
//!
//! - [`index`]: HNSW index over the catalog ([`hnsw`], persisted via [`persistence`])
//! - [`geo`]: haversine distance and continent zones
//! - [`consensus`]: spatial clustering, IQR outlier rejection, weighted-median centroid
//! - [`confidence`]: calibrated confidence and uncertainty radius
//! - [`visibility`]: the disclose / withhold gate
//! - [`locate`]: all of the above behind [`Geolocator::locate`]
//! - [`handle`]: single-flight, swappable ownership of the built index
//!
//! ```
//! use geolocus::{GateFlags, GeoConfig, GeoIndex, Geolocator, HNSWParams, ReferenceRecord};
//!
//! let records = vec![
//!     ReferenceRecord::new("a", "Golden Gate Bridge", 37.8199, -122.4783, vec![1.0, 0.0]),
//!     ReferenceRecord::new("b", "Golden Gate Bridge", 37.8201, -122.4780, vec![0.99, 0.1]),
//!     ReferenceRecord::new("c", "Eiffel Tower", 48.8584, 2.2945, vec![0.0, 1.0]),
//! ];
//! let index = GeoIndex::build_from(2, HNSWParams::default(), records)?;
//! let estimate = Geolocator::new(GeoConfig::standard())
//!     .locate(&index, &[1.0, 0.0], GateFlags::default())?;
//! assert!(estimate.result.confidence > 0.0);
//! # Ok::<(), geolocus::GeoError>(())
//! ```
//!
//! # Critical Nuances
//!
//! ## Confusers
//!
//! Landmarks are copied. A replica Eiffel Tower in Las Vegas embeds almost
//! exactly like the original, so the top match alone is not evidence. The
//! dominant-continent filter and seed clustering exist to outvote these
//! cross-continent lookalikes.
//!
//! ## Errors vs. weak evidence
//!
//! An empty catalog, a malformed vector or a non-finite coordinate is a
//! [`GeoError`]. Scattered matches, a wide radius and low confidence are normal
//! outcomes reported through [`VisibilityDecision`]; they never become errors.

pub mod aggregate;
pub mod catalog;
pub mod confidence;
pub mod config;
pub mod consensus;
pub mod distance;
pub mod error;
pub mod geo;
pub mod handle;
pub mod hnsw;
pub mod index;
pub mod locate;
pub mod persistence;
pub mod simd;
pub mod visibility;

pub use aggregate::{aggregate_matches, AggregatedResult, AggregationDiagnostics, Location};
pub use catalog::{Match, ReferenceRecord};
pub use confidence::{ConfidenceInputs, ConfidenceScorer, ConfidenceTier};
pub use config::{AccuracyMode, GeoConfig, ScoringBounds};
pub use consensus::{pick_consensus_cluster, remove_outliers, ClusterKind, ConsensusCluster};
pub use error::{GeoError, Result};
pub use handle::IndexHandle;
pub use hnsw::HNSWParams;
pub use index::{GeoIndex, IndexStats};
pub use locate::{Geolocator, LocationEstimate};
pub use visibility::{
    analyze_match_consensus, decide_location_visibility, GateFlags, MatchConsensus,
    VisibilityDecision, WithholdReason,
};
