//! Error types for geolocus.
//!
//! Everything here is a contract or data-integrity failure. Weak consensus, wide
//! spread and low confidence are *not* errors; they are reported through
//! [`VisibilityDecision`](crate::visibility::VisibilityDecision).

use crate::persistence::PersistenceError;
use thiserror::Error;

/// Errors surfaced by the index, the aggregation pipeline and catalog loading.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The index was queried before a successful `build` or verified `load`.
    #[error("index has not been built")]
    IndexNotBuilt,

    /// `build` was called with zero reference records.
    #[error("cannot build an index over an empty catalog")]
    EmptyCatalog,

    /// A query or catalog vector has the wrong length or holds non-finite values.
    #[error("invalid vector{}: {reason}", record_suffix(.record))]
    InvalidVector {
        /// Catalog record id, `None` for query vectors.
        record: Option<String>,
        reason: String,
    },

    /// A caller-supplied parameter is out of its valid domain (e.g. `k == 0`).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Clustering produced no candidates, or a candidate carries corrupt coordinates.
    #[error("aggregation failed: {0}")]
    AggregationFailure(String),

    /// The final centroid is not a finite coordinate.
    #[error("invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    /// Index persistence failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A catalog snapshot could not be parsed.
    #[error("catalog error: {0}")]
    Catalog(String),
}

fn record_suffix(record: &Option<String>) -> String {
    record
        .as_ref()
        .map(|r| format!(" for record {r}"))
        .unwrap_or_default()
}

impl GeoError {
    pub(crate) fn dimension_mismatch(record: Option<&str>, expected: usize, actual: usize) -> Self {
        Self::InvalidVector {
            record: record.map(str::to_string),
            reason: format!("expected {expected} dimensions, got {actual}"),
        }
    }

    pub(crate) fn non_finite(record: Option<&str>) -> Self {
        Self::InvalidVector {
            record: record.map(str::to_string),
            reason: "vector contains non-finite values".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;
