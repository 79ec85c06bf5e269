//! The reference-catalog ANN index.
//!
//! [`GeoIndex`] pairs an [`HNSWIndex`] over unit-normalized embeddings with the
//! catalog records it was built from, so that search results come back as
//! [`Match`]es carrying label and coordinates. Similarity is `1 - distance`,
//! clamped to `[-1, 1]`.

use crate::catalog::{Match, ReferenceRecord};
use crate::distance::{normalized_checked, similarity_from_distance};
use crate::error::{GeoError, Result};
use crate::hnsw::{HNSWIndex, HNSWParams};
use crate::persistence::{Directory, HNSWSegmentReader, HNSWSegmentWriter, PersistenceError};
use serde::Serialize;
use std::time::Instant;

/// Introspection snapshot of an index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub num_vectors: usize,
    pub dimension: usize,
    pub num_layers: usize,
    pub size_bytes: usize,
    pub algorithm: &'static str,
}

/// ANN index over a reference catalog with a fixed embedding dimensionality.
#[derive(Debug, Clone)]
pub struct GeoIndex {
    dimension: usize,
    params: HNSWParams,
    graph: Option<HNSWIndex>,
    records: Vec<ReferenceRecord>,
}

impl GeoIndex {
    /// An empty, not-yet-ready index for `dimension`-long embeddings.
    pub fn new(dimension: usize, params: HNSWParams) -> Result<Self> {
        // Validates dimension and params up front.
        HNSWIndex::with_params(dimension, params.clone())?;
        Ok(Self {
            dimension,
            params,
            graph: None,
            records: Vec::new(),
        })
    }

    /// Convenience: [`GeoIndex::new`] followed by [`GeoIndex::build`].
    pub fn build_from(
        dimension: usize,
        params: HNSWParams,
        records: Vec<ReferenceRecord>,
    ) -> Result<Self> {
        let mut index = Self::new(dimension, params)?;
        index.build(records)?;
        Ok(index)
    }

    /// Build the graph over `records`.
    ///
    /// Fails with [`GeoError::EmptyCatalog`] for zero records and
    /// [`GeoError::InvalidVector`] for a wrong-length or non-finite vector. On
    /// failure the index keeps whatever state it had before the call.
    pub fn build(&mut self, records: Vec<ReferenceRecord>) -> Result<()> {
        if records.is_empty() {
            return Err(GeoError::EmptyCatalog);
        }
        if u32::try_from(records.len()).is_err() {
            return Err(GeoError::InvalidParameter(format!(
                "catalog of {} records exceeds the u32 id space",
                records.len()
            )));
        }

        let started = Instant::now();
        let mut graph = HNSWIndex::with_params(self.dimension, self.params.clone())?;
        for (position, record) in records.iter().enumerate() {
            record.validate_coordinates()?;
            let unit = normalized_checked(&record.vector, self.dimension, Some(&record.id))?;
            graph.add(position as u32, unit)?;
        }
        graph.build()?;

        tracing::info!(
            records = records.len(),
            dimension = self.dimension,
            layers = graph.num_layers(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built reference index"
        );

        self.graph = Some(graph);
        self.records = records;
        Ok(())
    }

    /// The `k` most similar catalog records, most similar first.
    ///
    /// Returns `min(k, size())` matches. Ties keep catalog insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Match>> {
        let ef = self.params.ef_search;
        self.search_with_ef(query, k, ef)
    }

    /// [`GeoIndex::search`] with an explicit query-time candidate list size.
    pub fn search_with_ef(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<Match>> {
        let graph = self.graph.as_ref().ok_or(GeoError::IndexNotBuilt)?;
        if k == 0 {
            return Err(GeoError::InvalidParameter("k must be positive".to_string()));
        }
        let unit = normalized_checked(query, self.dimension, None)?;
        let hits = graph.search(&unit, k, ef)?;
        tracing::trace!(k, ef, hits = hits.len(), "ann search");
        Ok(self.to_matches(hits))
    }

    /// Exhaustive search, for recall checks and tiny catalogs.
    pub fn search_exact(&self, query: &[f32], k: usize) -> Result<Vec<Match>> {
        let graph = self.graph.as_ref().ok_or(GeoError::IndexNotBuilt)?;
        if k == 0 {
            return Err(GeoError::InvalidParameter("k must be positive".to_string()));
        }
        let unit = normalized_checked(query, self.dimension, None)?;
        Ok(self.to_matches(graph.search_exact(&unit, k)?))
    }

    fn to_matches(&self, hits: Vec<(u32, f32)>) -> Vec<Match> {
        hits.into_iter()
            .map(|(position, distance)| {
                let record = &self.records[position as usize];
                Match::from_record(record, f64::from(similarity_from_distance(distance)))
            })
            .collect()
    }

    /// Persist the graph as segment `segment_id` of `directory`.
    pub fn save(&self, directory: &dyn Directory, segment_id: u64) -> Result<()> {
        let graph = self.graph.as_ref().ok_or(GeoError::IndexNotBuilt)?;
        HNSWSegmentWriter::new(directory, segment_id).write_hnsw_index(graph)?;
        tracing::info!(
            segment_id,
            vectors = graph.num_vectors(),
            "saved reference index"
        );
        Ok(())
    }

    /// Restore a saved graph for the catalog snapshot `records`.
    ///
    /// The stored vector count must equal `records.len()` and the stored
    /// dimensionality must equal `dimension`; otherwise the load fails with a
    /// persistence error for which
    /// [`requires_rebuild`](PersistenceError::requires_rebuild) is true.
    pub fn load(
        directory: &dyn Directory,
        segment_id: u64,
        dimension: usize,
        records: Vec<ReferenceRecord>,
    ) -> Result<Self> {
        let reader = HNSWSegmentReader::load(directory, segment_id)?;
        if reader.dimension() != dimension {
            return Err(PersistenceError::DimensionMismatch {
                expected: dimension,
                actual: reader.dimension(),
            }
            .into());
        }
        if reader.num_vectors() != records.len() {
            tracing::warn!(
                segment_id,
                stored = reader.num_vectors(),
                catalog = records.len(),
                "persisted index does not match catalog"
            );
            return Err(PersistenceError::StaleIndex {
                expected: records.len(),
                actual: reader.num_vectors(),
            }
            .into());
        }
        for record in &records {
            record.validate_coordinates()?;
            normalized_checked(&record.vector, dimension, Some(&record.id))?;
        }

        let graph = reader.load_index()?;
        if !graph.is_built() {
            return Err(PersistenceError::Format("segment was saved before build".to_string()).into());
        }
        tracing::info!(segment_id, vectors = graph.num_vectors(), "loaded reference index");

        Ok(Self {
            dimension,
            params: graph.params().clone(),
            graph: Some(graph),
            records,
        })
    }

    /// Number of indexed records; zero until ready.
    pub fn size(&self) -> usize {
        self.graph.as_ref().map_or(0, |g| g.num_vectors())
    }

    /// True once a build or verified load has completed.
    pub fn ready(&self) -> bool {
        self.graph.as_ref().is_some_and(|g| g.is_built())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn params(&self) -> &HNSWParams {
        &self.params
    }

    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            num_vectors: self.size(),
            dimension: self.dimension,
            num_layers: self.graph.as_ref().map_or(0, |g| g.num_layers()),
            size_bytes: self.graph.as_ref().map_or(0, |g| g.size_bytes()),
            algorithm: "HNSW",
        }
    }
}
