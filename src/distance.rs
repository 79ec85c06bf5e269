//! Cosine geometry for embedding vectors.
//!
//! ## Important nuance
//!
//! The HNSW graph uses dot-product cosine distance for speed and therefore expects
//! inputs to be **L2-normalized**. Normalization is done once, at the index boundary
//! ([`GeoIndex::build`](crate::index::GeoIndex::build) and
//! [`GeoIndex::search`](crate::index::GeoIndex::search)); embedding providers are not
//! required to pre-normalize.

use crate::error::{GeoError, Result};
use crate::simd;

/// Cosine distance `1 - cos(a, b)`; computes norms, so inputs need not be normalized.
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    1.0 - simd::cosine(a, b).clamp(-1.0, 1.0)
}

/// Cosine distance for **L2-normalized** vectors: `1 - dot(a, b)`.
///
/// Faster than [`cosine_distance`] but meaningless if inputs are not normalized.
#[inline]
#[must_use]
pub fn cosine_distance_normalized(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    1.0 - simd::dot(a, b)
}

/// Convert a cosine distance back to a similarity, clamped to `[-1, 1]`.
#[inline]
#[must_use]
pub fn similarity_from_distance(distance: f32) -> f32 {
    let similarity = 1.0 - distance;
    if similarity.is_nan() {
        return -1.0;
    }
    similarity.clamp(-1.0, 1.0)
}

/// Check length and finiteness, then return the unit-length copy of `v`.
///
/// `record` names the catalog entry for error messages (`None` for queries).
/// A zero vector cannot be normalized and is rejected.
pub fn normalized_checked(v: &[f32], dimension: usize, record: Option<&str>) -> Result<Vec<f32>> {
    if v.len() != dimension {
        return Err(GeoError::dimension_mismatch(record, dimension, v.len()));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(GeoError::non_finite(record));
    }
    let n = simd::norm(v);
    if !n.is_finite() || n < 1e-10 {
        return Err(GeoError::InvalidVector {
            record: record.map(str::to_string),
            reason: "vector has zero norm".to_string(),
        });
    }
    Ok(v.iter().map(|x| x / n).collect())
}
