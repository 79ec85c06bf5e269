//! HNSW index storage and the public build/search surface.

use crate::distance::cosine_distance_normalized;
use crate::error::{GeoError, Result};
use crate::hnsw::construction::construct_graph;
use crate::hnsw::search::greedy_search_layer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Hard cap on the number of layers; level draws above this are clipped.
pub(crate) const MAX_LEVEL: u8 = 15;

/// Neighbor selection heuristic applied when wiring a node into a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NeighborhoodDiversification {
    /// RND: keep candidate `j` only if `dist(q, j) < dist(i, j)` for every selected `i`.
    RelativeNeighborhood,
    /// Relaxed RND: `dist(q, j) < alpha * dist(i, j)`. Denser graphs, `alpha >= 1`.
    RelaxedRelative { alpha: f32 },
}

impl Default for NeighborhoodDiversification {
    fn default() -> Self {
        Self::RelativeNeighborhood
    }
}

/// Construction and query parameters.
///
/// The defaults favor recall over raw speed, which is the right trade for
/// reference catalogs below roughly 100K vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HNSWParams {
    /// Out-degree on upper layers.
    pub m: usize,
    /// Out-degree on the base layer (conventionally `2 * m`).
    pub m_max: usize,
    /// Level generation factor, `1 / ln(m)`.
    pub m_l: f64,
    /// Candidate list size while building.
    pub ef_construction: usize,
    /// Candidate list size while searching.
    pub ef_search: usize,
    /// Seed for level assignment; a fixed seed makes builds reproducible.
    pub seed: u64,
    pub neighborhood_diversification: NeighborhoodDiversification,
}

impl Default for HNSWParams {
    fn default() -> Self {
        Self::with_m(16)
    }
}

impl HNSWParams {
    /// Defaults scaled around out-degree `m`.
    pub fn with_m(m: usize) -> Self {
        let m = m.max(2);
        Self {
            m,
            m_max: m * 2,
            m_l: 1.0 / (m as f64).ln(),
            ef_construction: 200,
            ef_search: 100,
            seed: 0x6765_6f6c,
            neighborhood_diversification: NeighborhoodDiversification::default(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.m < 2 || self.m_max < self.m {
            return Err(GeoError::InvalidParameter(format!(
                "need 2 <= m <= m_max, got m={} m_max={}",
                self.m, self.m_max
            )));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(GeoError::InvalidParameter(
                "ef_construction and ef_search must be positive".to_string(),
            ));
        }
        if !(self.m_l.is_finite() && self.m_l > 0.0) {
            return Err(GeoError::InvalidParameter(format!(
                "m_l must be positive and finite, got {}",
                self.m_l
            )));
        }
        Ok(())
    }
}

/// One layer of the graph: a neighbor list per node (empty for nodes above their level).
#[derive(Debug, Clone)]
pub(crate) struct Layer {
    neighbors: Vec<SmallVec<[u32; 16]>>,
}

impl Layer {
    pub(crate) fn new_uncompressed(neighbors: Vec<SmallVec<[u32; 16]>>) -> Self {
        Self { neighbors }
    }

    pub(crate) fn get_neighbors(&self, id: u32) -> &[u32] {
        self.neighbors
            .get(id as usize)
            .map(|n| n.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn get_neighbors_mut(&mut self) -> &mut Vec<SmallVec<[u32; 16]>> {
        &mut self.neighbors
    }

    pub(crate) fn get_all_neighbors(&self) -> &[SmallVec<[u32; 16]>] {
        &self.neighbors
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.neighbors.iter().map(|n| n.len()).sum()
    }
}

/// Hierarchical Navigable Small World index over unit-length vectors.
///
/// Vectors live in one flat buffer (`num_vectors * dimension`). Internal node ids
/// are insertion positions; `doc_ids` maps them back to caller ids.
#[derive(Debug, Clone)]
pub struct HNSWIndex {
    pub(crate) vectors: Vec<f32>,
    pub(crate) dimension: usize,
    pub(crate) num_vectors: usize,
    pub(crate) layers: Vec<Layer>,
    pub(crate) layer_assignments: Vec<u8>,
    pub(crate) params: HNSWParams,
    pub(crate) built: bool,
    pub(crate) doc_ids: Vec<u32>,
    entry_point: Option<u32>,
}

impl HNSWIndex {
    /// Create an index with out-degree `m` (upper layers) and `m_max` (base layer).
    pub fn new(dimension: usize, m: usize, m_max: usize) -> Result<Self> {
        let params = HNSWParams {
            m_max,
            ..HNSWParams::with_m(m)
        };
        Self::with_params(dimension, params)
    }

    pub fn with_params(dimension: usize, params: HNSWParams) -> Result<Self> {
        if dimension == 0 {
            return Err(GeoError::InvalidParameter(
                "dimension must be positive".to_string(),
            ));
        }
        params.validate()?;
        Ok(Self {
            vectors: Vec::new(),
            dimension,
            num_vectors: 0,
            layers: Vec::new(),
            layer_assignments: Vec::new(),
            params,
            built: false,
            doc_ids: Vec::new(),
            entry_point: None,
        })
    }

    /// Reassemble an index from persisted parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        vectors: Vec<f32>,
        dimension: usize,
        num_vectors: usize,
        layers: Vec<Layer>,
        layer_assignments: Vec<u8>,
        params: HNSWParams,
        built: bool,
        doc_ids: Vec<u32>,
    ) -> Self {
        let entry_point = top_entry_point(&layer_assignments);
        Self {
            vectors,
            dimension,
            num_vectors,
            layers,
            layer_assignments,
            params,
            built,
            doc_ids,
            entry_point,
        }
    }

    /// Append a vector. Must already be unit length; invalidates any previous build.
    pub fn add(&mut self, doc_id: u32, vector: Vec<f32>) -> Result<()> {
        self.add_slice(doc_id, &vector)
    }

    pub fn add_slice(&mut self, doc_id: u32, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(GeoError::dimension_mismatch(
                None,
                self.dimension,
                vector.len(),
            ));
        }
        self.vectors.extend_from_slice(vector);
        self.doc_ids.push(doc_id);
        self.num_vectors += 1;
        self.built = false;
        Ok(())
    }

    /// Assign levels and wire the graph. Required before [`HNSWIndex::search`].
    pub fn build(&mut self) -> Result<()> {
        if self.num_vectors == 0 {
            return Err(GeoError::EmptyCatalog);
        }

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let m_l = self.params.m_l;
        self.layer_assignments = (0..self.num_vectors)
            .map(|_| {
                let u: f64 = rng.random::<f64>();
                let level = (-(1.0 - u).ln() * m_l).floor();
                (level as u8).min(MAX_LEVEL)
            })
            .collect();

        construct_graph(self)?;
        self.entry_point = top_entry_point(&self.layer_assignments);
        self.built = true;
        Ok(())
    }

    /// Approximate k-nearest neighbors as `(doc_id, cosine_distance)`, nearest first.
    ///
    /// `ef` is raised to `k` when smaller. Ties in distance resolve by insertion order.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<(u32, f32)>> {
        if !self.built {
            return Err(GeoError::IndexNotBuilt);
        }
        if k == 0 {
            return Err(GeoError::InvalidParameter("k must be positive".to_string()));
        }
        if query.len() != self.dimension {
            return Err(GeoError::dimension_mismatch(
                None,
                self.dimension,
                query.len(),
            ));
        }
        let Some(entry) = self.entry_point else {
            return Err(GeoError::IndexNotBuilt);
        };

        let ef = ef.max(k);
        let top_layer = self.layer_assignments[entry as usize] as usize;

        // Greedy descent with ef=1 down to layer 1.
        let mut entry_point = entry;
        for layer_idx in (1..=top_layer.min(self.layers.len().saturating_sub(1))).rev() {
            let nearest = greedy_search_layer(
                query,
                entry_point,
                &self.layers[layer_idx],
                &self.vectors,
                self.dimension,
                1,
            );
            if let Some((best, _)) = nearest.first() {
                entry_point = *best;
            }
        }

        let mut candidates = greedy_search_layer(
            query,
            entry_point,
            &self.layers[0],
            &self.vectors,
            self.dimension,
            ef,
        );
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .map(|(id, dist)| (self.doc_ids[id as usize], dist))
            .collect())
    }

    /// Exhaustive search with the same output contract as [`HNSWIndex::search`].
    pub fn search_exact(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>> {
        if self.num_vectors == 0 {
            return Err(GeoError::IndexNotBuilt);
        }
        if k == 0 {
            return Err(GeoError::InvalidParameter("k must be positive".to_string()));
        }
        if query.len() != self.dimension {
            return Err(GeoError::dimension_mismatch(
                None,
                self.dimension,
                query.len(),
            ));
        }
        let mut all: Vec<(u32, f32)> = (0..self.num_vectors)
            .map(|i| {
                (
                    i as u32,
                    cosine_distance_normalized(query, self.get_vector(i)),
                )
            })
            .collect();
        all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        all.truncate(k);
        Ok(all
            .into_iter()
            .map(|(id, dist)| (self.doc_ids[id as usize], dist))
            .collect())
    }

    pub(crate) fn get_vector(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn num_vectors(&self) -> usize {
        self.num_vectors
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn params(&self) -> &HNSWParams {
        &self.params
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Approximate heap footprint: vectors plus adjacency lists.
    pub fn size_bytes(&self) -> usize {
        self.vectors.len() * std::mem::size_of::<f32>()
            + self
                .layers
                .iter()
                .map(|l| l.edge_count() * std::mem::size_of::<u32>())
                .sum::<usize>()
            + self.doc_ids.len() * std::mem::size_of::<u32>()
            + self.layer_assignments.len()
    }
}

/// First node holding the highest level, matching the insertion-order entry point.
fn top_entry_point(layer_assignments: &[u8]) -> Option<u32> {
    let max = *layer_assignments.iter().max()?;
    layer_assignments
        .iter()
        .position(|&l| l == max)
        .map(|p| p as u32)
}
