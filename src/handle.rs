//! Shared, swappable ownership of the built index.
//!
//! [`IndexHandle`] replaces a process-wide index global. The first callers to
//! find it empty share a single build; later rebuilds construct a fresh
//! [`GeoIndex`] and swap it in, so in-flight searches keep the `Arc` they
//! already hold and never observe a half-built structure.
//!
//! # Thread Safety
//!
//! - `RwLock<Option<Arc<GeoIndex>>>` holds the published index.
//! - A `Mutex<()>` build gate serializes builds; callers that queue on it
//!   re-check the slot before building.

use crate::catalog::ReferenceRecord;
use crate::error::{GeoError, Result};
use crate::hnsw::HNSWParams;
use crate::index::GeoIndex;
use crate::persistence::Directory;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct IndexHandle {
    current: RwLock<Option<Arc<GeoIndex>>>,
    build_gate: Mutex<()>,
    generation: AtomicU64,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("ready", &self.ready())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that already holds `index`.
    pub fn with_index(index: GeoIndex) -> Self {
        let handle = Self::new();
        handle.install(index);
        handle
    }

    /// The published index, if any. Never blocks on a running build.
    pub fn current(&self) -> Option<Arc<GeoIndex>> {
        self.current.read().clone()
    }

    pub fn ready(&self) -> bool {
        self.current.read().as_ref().is_some_and(|index| index.ready())
    }

    /// Number of indexes installed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Return the published index, building it with `build` if there is none.
    ///
    /// Concurrent callers on an empty handle run `build` once and all receive
    /// the same `Arc`. A failed build publishes nothing; the error goes to the
    /// caller that ran it and the next caller tries again.
    pub fn get_or_build<F>(&self, build: F) -> Result<Arc<GeoIndex>>
    where
        F: FnOnce() -> Result<GeoIndex>,
    {
        if let Some(index) = self.current() {
            return Ok(index);
        }

        let _gate = self.build_gate.lock();
        if let Some(index) = self.current() {
            return Ok(index);
        }
        let index = build()?;
        Ok(self.publish(index))
    }

    /// [`get_or_build`](Self::get_or_build) that first tries a saved segment.
    ///
    /// `records` is called at most once. A segment that is missing, stale, corrupt,
    /// or saved for another dimension is rebuilt from the records and saved back;
    /// any other persistence error is returned.
    pub fn get_or_load_or_build<F>(
        &self,
        directory: &dyn Directory,
        segment_id: u64,
        dimension: usize,
        params: HNSWParams,
        records: F,
    ) -> Result<Arc<GeoIndex>>
    where
        F: FnOnce() -> Result<Vec<ReferenceRecord>>,
    {
        self.get_or_build(|| {
            let records = records()?;
            match GeoIndex::load(directory, segment_id, dimension, records.clone()) {
                Ok(index) => Ok(index),
                Err(GeoError::Persistence(e)) if e.requires_rebuild() => {
                    tracing::info!(segment_id, reason = %e, "rebuilding reference index");
                    let index = GeoIndex::build_from(dimension, params, records)?;
                    index.save(directory, segment_id)?;
                    Ok(index)
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Build a replacement with `build` and swap it in.
    ///
    /// Readers keep serving from the previous index until the swap. If `build`
    /// fails the previous index stays published.
    pub fn rebuild<F>(&self, build: F) -> Result<Arc<GeoIndex>>
    where
        F: FnOnce() -> Result<GeoIndex>,
    {
        let _gate = self.build_gate.lock();
        let index = build()?;
        Ok(self.publish(index))
    }

    /// Swap in an already-built index, returning the shared handle to it.
    pub fn install(&self, index: GeoIndex) -> Arc<GeoIndex> {
        let _gate = self.build_gate.lock();
        self.publish(index)
    }

    /// Drop the published index so the next [`get_or_build`](Self::get_or_build)
    /// builds again. Returns the index that was published.
    pub fn invalidate(&self) -> Option<Arc<GeoIndex>> {
        let _gate = self.build_gate.lock();
        let previous = self.current.write().take();
        if previous.is_some() {
            tracing::debug!(generation = self.generation(), "invalidated reference index");
        }
        previous
    }

    fn publish(&self, index: GeoIndex) -> Arc<GeoIndex> {
        let index = Arc::new(index);
        let previous = self.current.write().replace(Arc::clone(&index));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(
            generation,
            records = index.size(),
            replaced = previous.is_some(),
            "published reference index"
        );
        index
    }
}
