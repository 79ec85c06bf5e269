//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor search.
//!
//! # Algorithm
//!
//! HNSW constructs a multi-layer graph where:
//! - **Upper layers**: sparse, long-range connections for fast navigation
//! - **Base layer**: dense, local connections for precise search
//! - **Search**: greedy descent from the top layer, then a beam search of width
//!   `ef` on the base layer
//!
//! Distances are cosine distances computed as `1 - dot(a, b)`, so every stored
//! vector and every query must be unit length. [`GeoIndex`](crate::index::GeoIndex)
//! takes care of that; use this module directly only with normalized data.
//!
//! # Usage
//!
//! ```rust
//! use geolocus::hnsw::HNSWIndex;
//!
//! # fn main() -> Result<(), geolocus::GeoError> {
//! let mut index = HNSWIndex::new(2, 8, 16)?;
//! index.add(0, vec![1.0, 0.0])?;
//! index.add(1, vec![0.0, 1.0])?;
//! index.build()?;
//!
//! let results = index.search(&[0.8, 0.6], 1, 32)?;
//! assert_eq!(results[0].0, 0);
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - Malkov & Yashunin (2016): "Efficient and robust approximate nearest neighbor search
//!   using Hierarchical Navigable Small World graphs"

pub(crate) mod construction;
pub(crate) mod graph;
pub(crate) mod search;

pub use graph::{HNSWIndex, HNSWParams, NeighborhoodDiversification};
