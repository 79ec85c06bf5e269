//! HNSW graph persistence.
//!
//! Segment layout under `segments/segment_hnsw_{id}/`:
//! - `vectors.bin`: normalized vectors, SoA order (all of dimension 0, then 1, ...)
//! - `doc_ids.bin`: external ids aligned with internal insertion order
//! - `layer_assignments.bin`: one level byte per vector
//! - `layers.bin`: layer count, then per layer the neighbor lists
//! - `params.bin`: construction/query parameters
//! - `metadata.bin`: magic, format version, dimension, vector count, built flag
//!
//! All integers are little-endian. `metadata.bin` is published last with an
//! atomic write; a short or unrecognized metadata file reads as corrupt.

use crate::hnsw::graph::{Layer, MAX_LEVEL};
use crate::hnsw::{HNSWIndex, HNSWParams, NeighborhoodDiversification};
use crate::persistence::directory::Directory;
use crate::persistence::error::{PersistenceError, PersistenceResult};
use smallvec::SmallVec;
use std::io::{Read, Write};

/// Magic bytes opening `metadata.bin`.
pub const SEGMENT_MAGIC: &[u8; 4] = b"GLHN";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Magic, version, dimension, vector count, built flag.
const METADATA_LEN: usize = 4 + 4 + 4 + 4 + 1;

fn segment_dir(segment_id: u64) -> String {
    format!("segments/segment_hnsw_{segment_id}")
}

/// HNSW segment writer for graph persistence.
pub struct HNSWSegmentWriter<'a> {
    directory: &'a dyn Directory,
    segment_id: u64,
}

impl<'a> HNSWSegmentWriter<'a> {
    pub fn new(directory: &'a dyn Directory, segment_id: u64) -> Self {
        Self {
            directory,
            segment_id,
        }
    }

    /// Write an index to disk, replacing any segment with the same id.
    pub fn write_hnsw_index(&mut self, index: &HNSWIndex) -> PersistenceResult<()> {
        let segment_dir = segment_dir(self.segment_id);
        let metadata_path = format!("{segment_dir}/metadata.bin");
        // Drop the commit marker first so an interrupted overwrite reads as absent.
        if self.directory.exists(&metadata_path) {
            self.directory.delete(&metadata_path)?;
        }
        self.directory.create_dir_all(&segment_dir)?;

        let mut vectors_file = self
            .directory
            .create_file(&format!("{segment_dir}/vectors.bin"))?;
        for d in 0..index.dimension {
            for v_idx in 0..index.num_vectors {
                let value = index.vectors[v_idx * index.dimension + d];
                vectors_file.write_all(&value.to_le_bytes())?;
            }
        }
        vectors_file.flush()?;
        drop(vectors_file);

        let mut doc_ids_file = self
            .directory
            .create_file(&format!("{segment_dir}/doc_ids.bin"))?;
        for &doc_id in &index.doc_ids {
            doc_ids_file.write_all(&doc_id.to_le_bytes())?;
        }
        doc_ids_file.flush()?;
        drop(doc_ids_file);

        let mut assignments_file = self
            .directory
            .create_file(&format!("{segment_dir}/layer_assignments.bin"))?;
        assignments_file.write_all(&index.layer_assignments)?;
        assignments_file.flush()?;
        drop(assignments_file);

        let mut layers_file = self
            .directory
            .create_file(&format!("{segment_dir}/layers.bin"))?;
        layers_file.write_all(&(index.layers.len() as u32).to_le_bytes())?;
        for layer in &index.layers {
            let neighbors = layer.get_all_neighbors();
            layers_file.write_all(&(neighbors.len() as u32).to_le_bytes())?;
            for neighbor_list in neighbors {
                layers_file.write_all(&(neighbor_list.len() as u32).to_le_bytes())?;
                for &neighbor_id in neighbor_list.iter() {
                    layers_file.write_all(&neighbor_id.to_le_bytes())?;
                }
            }
        }
        layers_file.flush()?;
        drop(layers_file);

        let params = &index.params;
        let mut params_file = self
            .directory
            .create_file(&format!("{segment_dir}/params.bin"))?;
        params_file.write_all(&(params.m as u32).to_le_bytes())?;
        params_file.write_all(&(params.m_max as u32).to_le_bytes())?;
        params_file.write_all(&params.m_l.to_le_bytes())?;
        params_file.write_all(&(params.ef_construction as u32).to_le_bytes())?;
        params_file.write_all(&(params.ef_search as u32).to_le_bytes())?;
        params_file.write_all(&params.seed.to_le_bytes())?;
        match params.neighborhood_diversification {
            NeighborhoodDiversification::RelativeNeighborhood => {
                params_file.write_all(&[0])?;
                params_file.write_all(&1.0f32.to_le_bytes())?;
            }
            NeighborhoodDiversification::RelaxedRelative { alpha } => {
                params_file.write_all(&[1])?;
                params_file.write_all(&alpha.to_le_bytes())?;
            }
        }
        params_file.flush()?;
        drop(params_file);

        let mut metadata = Vec::with_capacity(METADATA_LEN);
        metadata.extend_from_slice(SEGMENT_MAGIC);
        metadata.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        metadata.extend_from_slice(&(index.dimension as u32).to_le_bytes());
        metadata.extend_from_slice(&(index.num_vectors as u32).to_le_bytes());
        metadata.push(u8::from(index.is_built()));
        self.directory.atomic_write(&metadata_path, &metadata)?;

        Ok(())
    }
}

/// HNSW segment reader. Construction reads only the metadata.
pub struct HNSWSegmentReader<'a> {
    directory: &'a dyn Directory,
    segment_id: u64,
    dimension: usize,
    num_vectors: usize,
    built: bool,
}

impl<'a> HNSWSegmentReader<'a> {
    /// Open a committed segment. Fails with `NotFound` if it was never fully written.
    pub fn load(directory: &'a dyn Directory, segment_id: u64) -> PersistenceResult<Self> {
        let metadata_path = format!("{}/metadata.bin", segment_dir(segment_id));
        if !directory.exists(&metadata_path) {
            return Err(PersistenceError::NotFound(metadata_path));
        }
        let mut metadata = Vec::with_capacity(METADATA_LEN);
        directory
            .open_file(&metadata_path)?
            .read_to_end(&mut metadata)?;
        if metadata.len() < METADATA_LEN {
            return Err(PersistenceError::Corrupt(format!(
                "{metadata_path} holds {} of {METADATA_LEN} bytes",
                metadata.len()
            )));
        }
        if &metadata[..4] != SEGMENT_MAGIC {
            return Err(PersistenceError::Corrupt(format!(
                "bad segment magic {:?}",
                &metadata[..4]
            )));
        }
        let mut fields = &metadata[4..];
        let version = read_u32(&mut fields)?;
        if version != FORMAT_VERSION {
            return Err(PersistenceError::Format(format!(
                "unsupported format version {version}"
            )));
        }
        let dimension = read_u32(&mut fields)? as usize;
        let num_vectors = read_u32(&mut fields)? as usize;
        let built = read_u8(&mut fields)? != 0;

        Ok(Self {
            directory,
            segment_id,
            dimension,
            num_vectors,
            built,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_vectors(&self) -> usize {
        self.num_vectors
    }

    /// Reconstruct the full index in memory.
    pub fn load_index(&self) -> PersistenceResult<HNSWIndex> {
        let segment_dir = segment_dir(self.segment_id);
        let params = self.load_params(&segment_dir)?;

        let mut vectors_file = self
            .directory
            .open_file(&format!("{segment_dir}/vectors.bin"))?;
        let mut vectors = vec![0f32; self.num_vectors * self.dimension];
        for d in 0..self.dimension {
            for v_idx in 0..self.num_vectors {
                vectors[v_idx * self.dimension + d] = read_f32(&mut vectors_file)?;
            }
        }

        let mut doc_ids_file = self
            .directory
            .open_file(&format!("{segment_dir}/doc_ids.bin"))?;
        let doc_ids = (0..self.num_vectors)
            .map(|_| read_u32(&mut doc_ids_file))
            .collect::<PersistenceResult<Vec<u32>>>()?;

        let mut assignments_file = self
            .directory
            .open_file(&format!("{segment_dir}/layer_assignments.bin"))?;
        let mut layer_assignments = vec![0u8; self.num_vectors];
        assignments_file.read_exact(&mut layer_assignments)?;
        if layer_assignments.iter().any(|&l| l > MAX_LEVEL) {
            return Err(PersistenceError::Format(
                "layer assignment above maximum level".to_string(),
            ));
        }

        let mut layers_file = self
            .directory
            .open_file(&format!("{segment_dir}/layers.bin"))?;
        let num_layers = read_u32(&mut layers_file)? as usize;
        let expected_layers = layer_assignments
            .iter()
            .max()
            .map_or(0, |&l| l as usize + 1);
        if num_layers != expected_layers {
            return Err(PersistenceError::Format(format!(
                "expected {expected_layers} layers, found {num_layers}"
            )));
        }

        let mut layers = Vec::with_capacity(num_layers);
        for _ in 0..num_layers {
            let num_lists = read_u32(&mut layers_file)? as usize;
            if num_lists != self.num_vectors {
                return Err(PersistenceError::Format(format!(
                    "layer holds {num_lists} neighbor lists for {} vectors",
                    self.num_vectors
                )));
            }
            let mut neighbors_list = Vec::with_capacity(num_lists);
            for _ in 0..num_lists {
                let num_neighbors = read_u32(&mut layers_file)? as usize;
                let mut neighbors: SmallVec<[u32; 16]> = SmallVec::with_capacity(num_neighbors);
                for _ in 0..num_neighbors {
                    let id = read_u32(&mut layers_file)?;
                    if id as usize >= self.num_vectors {
                        return Err(PersistenceError::Format(format!(
                            "neighbor id {id} out of range"
                        )));
                    }
                    neighbors.push(id);
                }
                neighbors_list.push(neighbors);
            }
            layers.push(Layer::new_uncompressed(neighbors_list));
        }

        Ok(HNSWIndex::from_parts(
            vectors,
            self.dimension,
            self.num_vectors,
            layers,
            layer_assignments,
            params,
            self.built,
            doc_ids,
        ))
    }

    fn load_params(&self, segment_dir: &str) -> PersistenceResult<HNSWParams> {
        let mut params_file = self
            .directory
            .open_file(&format!("{segment_dir}/params.bin"))?;
        let m = read_u32(&mut params_file)? as usize;
        let m_max = read_u32(&mut params_file)? as usize;
        let m_l = read_f64(&mut params_file)?;
        let ef_construction = read_u32(&mut params_file)? as usize;
        let ef_search = read_u32(&mut params_file)? as usize;
        let seed = read_u64(&mut params_file)?;
        let tag = read_u8(&mut params_file)?;
        let alpha = read_f32(&mut params_file)?;
        let neighborhood_diversification = match tag {
            0 => NeighborhoodDiversification::RelativeNeighborhood,
            1 => NeighborhoodDiversification::RelaxedRelative { alpha },
            other => {
                return Err(PersistenceError::Format(format!(
                    "unknown diversification tag {other}"
                )))
            }
        };
        Ok(HNSWParams {
            m,
            m_max,
            m_l,
            ef_construction,
            ef_search,
            seed,
            neighborhood_diversification,
        })
    }
}

fn read_u8(r: &mut dyn Read) -> PersistenceResult<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_u32(r: &mut dyn Read) -> PersistenceResult<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(r: &mut dyn Read) -> PersistenceResult<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

fn read_f32(r: &mut dyn Read) -> PersistenceResult<f32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(f32::from_le_bytes(b))
}

fn read_f64(r: &mut dyn Read) -> PersistenceResult<f64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(f64::from_le_bytes(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::directory::MemoryDirectory;

    #[test]
    fn test_hnsw_segment_write_read() {
        let mut index = HNSWIndex::new(4, 8, 8).unwrap();
        let v0 = vec![1.0, 0.0, 0.0, 0.0];
        let v1 = vec![0.0, 1.0, 0.0, 0.0];
        index.add(42, v0.clone()).unwrap();
        index.add(7, v1.clone()).unwrap();
        index.build().unwrap();

        let mem = MemoryDirectory::new();
        HNSWSegmentWriter::new(&mem, 1)
            .write_hnsw_index(&index)
            .unwrap();

        let reader = HNSWSegmentReader::load(&mem, 1).unwrap();
        assert_eq!(reader.num_vectors(), 2);
        assert_eq!(reader.dimension(), 4);
        let loaded = reader.load_index().unwrap();
        assert_eq!(loaded.params(), index.params());

        assert_eq!(loaded.search(&v0, 1, 50).unwrap()[0].0, 42);
        assert_eq!(loaded.search(&v1, 1, 50).unwrap()[0].0, 7);
    }

    #[test]
    fn missing_metadata_reads_as_absent() {
        let mem = MemoryDirectory::new();
        let err = HNSWSegmentReader::load(&mem, 9).err().unwrap();
        assert!(err.requires_rebuild());
    }

    #[test]
    fn corrupt_magic_requires_rebuild() {
        let mem = MemoryDirectory::new();
        let mut bytes = b"NOPE".to_vec();
        bytes.extend_from_slice(&[0u8; 13]);
        mem.create_dir_all("segments/segment_hnsw_3").unwrap();
        mem.atomic_write("segments/segment_hnsw_3/metadata.bin", &bytes)
            .unwrap();
        let err = HNSWSegmentReader::load(&mem, 3).err().unwrap();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
        assert!(err.requires_rebuild());
    }

    #[test]
    fn truncated_metadata_requires_rebuild() {
        let mut index = HNSWIndex::new(2, 4, 8).unwrap();
        index.add(0, vec![1.0, 0.0]).unwrap();
        index.build().unwrap();
        let mem = MemoryDirectory::new();
        HNSWSegmentWriter::new(&mem, 4)
            .write_hnsw_index(&index)
            .unwrap();

        let path = "segments/segment_hnsw_4/metadata.bin";
        let mut full = Vec::new();
        mem.open_file(path).unwrap().read_to_end(&mut full).unwrap();
        assert_eq!(full.len(), METADATA_LEN);
        mem.atomic_write(path, &full[..6]).unwrap();

        let err = HNSWSegmentReader::load(&mem, 4).err().unwrap();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
        assert!(err.requires_rebuild());
    }

    #[test]
    fn unknown_version_is_a_format_error() {
        let mem = MemoryDirectory::new();
        let mut bytes = SEGMENT_MAGIC.to_vec();
        bytes.extend_from_slice(&99u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 9]);
        mem.create_dir_all("segments/segment_hnsw_5").unwrap();
        mem.atomic_write("segments/segment_hnsw_5/metadata.bin", &bytes)
            .unwrap();
        assert!(matches!(
            HNSWSegmentReader::load(&mem, 5),
            Err(PersistenceError::Format(_))
        ));
    }
}
