//! Beam search within one HNSW layer.

use crate::distance::cosine_distance_normalized;
use crate::hnsw::graph::Layer;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Frontier entry; the heap pops the *closest* candidate first.
#[derive(Clone, PartialEq)]
pub(crate) struct Candidate {
    pub(crate) id: u32,
    pub(crate) distance: f32,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // total_cmp keeps the ordering total even if a NaN slips through.
        self.distance
            .total_cmp(&other.distance)
            .reverse()
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result-set entry; the heap pops the *farthest* result first so it can be evicted.
#[derive(PartialEq)]
struct Furthest {
    id: u32,
    distance: f32,
}

impl Eq for Furthest {}

impl Ord for Furthest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Furthest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Standard HNSW layer search (Malkov & Yashunin, 2016).
///
/// Expands the closest unexplored candidate until it is farther than the worst of
/// the `ef` results held. Returns up to `ef` `(node, distance)` pairs, nearest first.
pub(crate) fn greedy_search_layer(
    query: &[f32],
    entry_point: u32,
    layer: &Layer,
    vectors: &[f32],
    dimension: usize,
    ef: usize,
) -> Vec<(u32, f32)> {
    let ef = ef.max(1);
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<Furthest> = BinaryHeap::with_capacity(ef + 1);
    let mut visited: HashSet<u32> = HashSet::with_capacity(ef * 2);

    let entry_distance = cosine_distance_normalized(
        query,
        get_vector(vectors, dimension, entry_point as usize),
    );
    candidates.push(Candidate {
        id: entry_point,
        distance: entry_distance,
    });
    results.push(Furthest {
        id: entry_point,
        distance: entry_distance,
    });
    visited.insert(entry_point);

    while let Some(candidate) = candidates.pop() {
        let worst = results.peek().map_or(f32::INFINITY, |r| r.distance);
        if candidate.distance > worst && results.len() >= ef {
            break;
        }

        for &neighbor_id in layer.get_neighbors(candidate.id) {
            if !visited.insert(neighbor_id) {
                continue;
            }
            let distance = cosine_distance_normalized(
                query,
                get_vector(vectors, dimension, neighbor_id as usize),
            );
            let worst = results.peek().map_or(f32::INFINITY, |r| r.distance);
            if results.len() < ef || distance < worst {
                candidates.push(Candidate {
                    id: neighbor_id,
                    distance,
                });
                results.push(Furthest {
                    id: neighbor_id,
                    distance,
                });
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    let mut output: Vec<(u32, f32)> = results.into_iter().map(|r| (r.id, r.distance)).collect();
    output.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    output
}

fn get_vector(vectors: &[f32], dimension: usize, idx: usize) -> &[f32] {
    let start = idx * dimension;
    &vectors[start..start + dimension]
}
