//! Reference catalog records and ranked matches.
//!
//! The catalog is a point-in-time batch snapshot produced by an external loader.
//! [`load_json`] and [`load_json_lines`] read the two snapshot formats the offline
//! tooling emits.

use crate::error::{GeoError, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Read};

/// One catalog entry. Immutable once an index is built over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    pub vector: Vec<f32>,
}

impl ReferenceRecord {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        lat: f64,
        lon: f64,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            lat,
            lon,
            vector,
        }
    }

    /// Reject records whose coordinates are non-finite or out of range.
    pub fn validate_coordinates(&self) -> Result<()> {
        if !valid_coordinate(self.lat, self.lon) {
            return Err(GeoError::Catalog(format!(
                "record {} has invalid coordinates ({}, {})",
                self.id, self.lat, self.lon
            )));
        }
        Ok(())
    }
}

/// A catalog record ranked against one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
    /// Cosine similarity, always within `[-1, 1]`.
    pub similarity: f64,
}

impl Match {
    /// A match without its embedding; similarity is clamped to `[-1, 1]`.
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        lat: f64,
        lon: f64,
        similarity: f64,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            lat,
            lon,
            vector: Vec::new(),
            similarity: clamp_similarity(similarity),
        }
    }

    pub(crate) fn from_record(record: &ReferenceRecord, similarity: f64) -> Self {
        Self {
            id: record.id.clone(),
            label: record.label.clone(),
            lat: record.lat,
            lon: record.lon,
            vector: record.vector.clone(),
            similarity: clamp_similarity(similarity),
        }
    }

    /// Similarity mapped onto `[0, 1]`: `(similarity + 1) / 2`.
    #[inline]
    pub fn score(&self) -> f64 {
        (self.similarity + 1.0) / 2.0
    }

    #[inline]
    pub fn has_finite_coordinates(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

fn clamp_similarity(similarity: f64) -> f64 {
    if similarity.is_nan() {
        -1.0
    } else {
        similarity.clamp(-1.0, 1.0)
    }
}

/// `lat ∈ [-90, 90]`, `lon ∈ [-180, 180]`, both finite.
pub fn valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Read a catalog stored as one JSON array of records.
pub fn load_json<R: Read>(reader: R) -> Result<Vec<ReferenceRecord>> {
    let records: Vec<ReferenceRecord> =
        serde_json::from_reader(reader).map_err(|e| GeoError::Catalog(e.to_string()))?;
    for record in &records {
        record.validate_coordinates()?;
    }
    tracing::debug!(records = records.len(), "loaded JSON catalog");
    Ok(records)
}

/// Read a catalog stored as JSON lines, one record per line. Blank lines are skipped.
pub fn load_json_lines<R: BufRead>(reader: R) -> Result<Vec<ReferenceRecord>> {
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| GeoError::Catalog(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReferenceRecord = serde_json::from_str(&line)
            .map_err(|e| GeoError::Catalog(format!("line {}: {e}", line_no + 1)))?;
        record.validate_coordinates()?;
        records.push(record);
    }
    tracing::debug!(records = records.len(), "loaded JSON-lines catalog");
    Ok(records)
}
