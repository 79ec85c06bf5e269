//! Disk persistence for the ANN graph.
//!
//! A saved index is one segment directory holding the normalized vectors, the
//! graph layers, level assignments, parameters and a metadata file. Metadata is
//! written last and acts as the commit marker: a segment without it is treated as
//! absent, so a crash mid-save never yields a half-readable index.
//!
//! Catalog records themselves are not persisted here. The caller supplies the
//! current catalog snapshot on load, and a segment whose vector count or
//! dimension disagrees with it is rejected as stale so the caller rebuilds.

pub mod directory;
pub mod error;
pub mod hnsw;

pub use directory::{Directory, FsDirectory, MemoryDirectory};
pub use error::{PersistenceError, PersistenceResult};
pub use hnsw::{HNSWSegmentReader, HNSWSegmentWriter};
