//! HNSW graph construction.

use crate::distance::cosine_distance_normalized;
use crate::error::{GeoError, Result};
use crate::hnsw::graph::{HNSWIndex, Layer, NeighborhoodDiversification};
use crate::hnsw::search::greedy_search_layer;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Select neighbors using (relaxed) relative neighborhood diversification.
///
/// Candidate `j` is kept if `dist(q, j) < alpha * dist(i, j)` for every already
/// selected `i`; `alpha = 1` is plain RND. Slots left over after diversification
/// are filled with the closest remaining candidates.
fn select_neighbors_rnd(
    candidates: &[(u32, f32)],
    m: usize,
    vectors: &[f32],
    dimension: usize,
    alpha: f32,
) -> Vec<u32> {
    if candidates.is_empty() || m == 0 {
        return Vec::new();
    }

    let mut sorted: Vec<(u32, f32)> = candidates.to_vec();
    sorted.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut selected: Vec<u32> = Vec::with_capacity(m.min(sorted.len()));
    selected.push(sorted[0].0);

    for &(candidate_id, query_to_candidate) in sorted.iter().skip(1) {
        if selected.len() >= m {
            break;
        }
        let candidate_vec = get_vector(vectors, dimension, candidate_id as usize);
        let diverse = selected.iter().all(|&selected_id| {
            let selected_vec = get_vector(vectors, dimension, selected_id as usize);
            query_to_candidate < alpha * cosine_distance_normalized(selected_vec, candidate_vec)
        });
        if diverse {
            selected.push(candidate_id);
        }
    }

    for &(id, _) in &sorted {
        if selected.len() >= m {
            break;
        }
        if !selected.contains(&id) {
            selected.push(id);
        }
    }

    selected
}

/// Select neighbors based on the configured diversification strategy.
pub(crate) fn select_neighbors(
    candidates: &[(u32, f32)],
    m: usize,
    vectors: &[f32],
    dimension: usize,
    strategy: &NeighborhoodDiversification,
) -> Vec<u32> {
    match strategy {
        NeighborhoodDiversification::RelativeNeighborhood => {
            select_neighbors_rnd(candidates, m, vectors, dimension, 1.0)
        }
        NeighborhoodDiversification::RelaxedRelative { alpha } => {
            select_neighbors_rnd(candidates, m, vectors, dimension, alpha.max(1.0))
        }
    }
}

pub(crate) fn get_vector(vectors: &[f32], dimension: usize, idx: usize) -> &[f32] {
    let start = idx * dimension;
    &vectors[start..start + dimension]
}

/// Keep the `m` closest ids of `owner`'s adjacency list.
fn prune_to_closest(
    neighbors: &mut SmallVec<[u32; 16]>,
    owner: &[f32],
    m: usize,
    vectors: &[f32],
    dimension: usize,
    known: &HashMap<u32, f32>,
) {
    if neighbors.len() <= m {
        return;
    }
    let mut scored: Vec<(u32, f32)> = neighbors
        .iter()
        .map(|&id| {
            let dist = known.get(&id).copied().unwrap_or_else(|| {
                cosine_distance_normalized(owner, get_vector(vectors, dimension, id as usize))
            });
            (id, dist)
        })
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.truncate(m);
    *neighbors = scored.into_iter().map(|(id, _)| id).collect();
}

/// Construct all graph layers from the stored vectors and level assignments.
///
/// Offline build that still honors insertion order: the entry point is always a
/// node that has already been inserted, and the closest node found on each layer
/// becomes the entry point for the layer below (Malkov & Yashunin, 2018).
pub(crate) fn construct_graph(index: &mut HNSWIndex) -> Result<()> {
    if index.num_vectors == 0 {
        return Err(GeoError::EmptyCatalog);
    }

    let max_layer = index.layer_assignments.iter().max().copied().unwrap_or(0) as usize;
    index.layers = (0..=max_layer)
        .map(|_| Layer::new_uncompressed(vec![SmallVec::new(); index.num_vectors]))
        .collect();

    let mut global_entry_point = 0u32;
    let mut global_entry_layer = index.layer_assignments[0] as usize;

    for current_id in 1..index.num_vectors {
        let current_layer = index.layer_assignments[current_id] as usize;
        let current_vector = index.get_vector(current_id).to_vec();
        let mut layer_entry_point = global_entry_point;

        // 1) Refine the entry point through layers above the node's own level.
        if global_entry_layer > current_layer {
            for layer_idx in ((current_layer + 1)..=global_entry_layer).rev() {
                let nearest = greedy_search_layer(
                    &current_vector,
                    layer_entry_point,
                    &index.layers[layer_idx],
                    &index.vectors,
                    index.dimension,
                    1,
                );
                if let Some((best, _)) = nearest.first() {
                    layer_entry_point = *best;
                }
            }
        }

        // 2) Connect on every shared layer, top down.
        for layer_idx in (0..=current_layer.min(global_entry_layer)).rev() {
            let candidates = greedy_search_layer(
                &current_vector,
                layer_entry_point,
                &index.layers[layer_idx],
                &index.vectors,
                index.dimension,
                index.params.ef_construction,
            );
            if let Some((best, _)) = candidates.first() {
                layer_entry_point = *best;
            }

            let m_actual = if layer_idx == 0 {
                index.params.m_max
            } else {
                index.params.m
            };

            // Only already-inserted nodes that live on this layer are eligible.
            let eligible: Vec<(u32, f32)> = candidates
                .into_iter()
                .filter(|&(id, _)| {
                    let id = id as usize;
                    id < current_id && index.layer_assignments[id] as usize >= layer_idx
                })
                .collect();

            let selected = select_neighbors(
                &eligible,
                m_actual,
                &index.vectors,
                index.dimension,
                &index.params.neighborhood_diversification,
            );

            let current_distances: HashMap<u32, f32> = eligible.iter().copied().collect();
            let dimension = index.dimension;
            let vectors = &index.vectors;
            let neighbors_vec = index.layers[layer_idx].get_neighbors_mut();

            for &neighbor_id in &selected {
                let forward = &mut neighbors_vec[current_id];
                if !forward.contains(&neighbor_id) {
                    forward.push(neighbor_id);
                }
                let reverse = &mut neighbors_vec[neighbor_id as usize];
                if !reverse.contains(&(current_id as u32)) {
                    reverse.push(current_id as u32);
                }
            }

            prune_to_closest(
                &mut neighbors_vec[current_id],
                &current_vector,
                m_actual,
                vectors,
                dimension,
                &current_distances,
            );

            for &neighbor_id in &selected {
                let neighbor_vec = get_vector(vectors, dimension, neighbor_id as usize);
                let mut known = HashMap::with_capacity(1);
                if let Some(&d) = current_distances.get(&neighbor_id) {
                    known.insert(current_id as u32, d);
                }
                prune_to_closest(
                    &mut neighbors_vec[neighbor_id as usize],
                    neighbor_vec,
                    m_actual,
                    vectors,
                    dimension,
                    &known,
                );
            }
        }

        // 3) A node reaching a new top level becomes the global entry point.
        if current_layer > global_entry_layer {
            global_entry_point = current_id as u32;
            global_entry_layer = current_layer;
        }
    }

    Ok(())
}
