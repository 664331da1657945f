// src/memory/index.rs — Exact inner-product index over unit vectors

use std::path::Path;

use crate::infra::errors::IndexError;
use crate::memory::embeddings::dot;
use crate::memory::persistence::{self, IndexSnapshot};

/// Best match for a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Inner product with the query (cosine similarity for unit vectors).
    pub score: f32,
    /// Id of the stored vector.
    pub id: u64,
}

/// Append-only, brute-force similarity index.
///
/// Vectors are stored flattened in insertion order; an entry's id is its
/// position. Callers must pass L2-normalized vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dim: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Load the index stored at `path`.
    ///
    /// Missing, unreadable, corrupt or dimension-incompatible files all yield
    /// a fresh empty index. The old file is left in place until the next
    /// `save` overwrites it.
    pub fn load(path: &Path, expected_dim: usize) -> Self {
        match Self::try_load(path, expected_dim) {
            Ok(index) => {
                tracing::info!(
                    path = %path.display(),
                    entries = index.len(),
                    dim = expected_dim,
                    "Loaded vector index"
                );
                index
            }
            Err(IndexError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.display(),
                    "Index file not found. Creating new index (dim {})",
                    expected_dim
                );
                Self::new(expected_dim)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "Could not load index: {}. Creating new index (dim {})",
                    e,
                    expected_dim
                );
                Self::new(expected_dim)
            }
        }
    }

    /// Strict variant of [`VectorIndex::load`] that reports why a file was
    /// not usable.
    pub fn try_load(path: &Path, expected_dim: usize) -> Result<Self, IndexError> {
        let IndexSnapshot { dim, data } = persistence::read_index(path)?;
        if dim != expected_dim {
            return Err(IndexError::IncompatibleDimension {
                expected: expected_dim,
                found: dim,
            });
        }
        Ok(Self { dim, data })
    }

    /// Overwrite `path` with the full index.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        persistence::write_index(path, self.dim, &self.data)?;
        tracing::debug!(path = %path.display(), entries = self.len(), "Saved vector index");
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return its id. Never deduplicates.
    pub fn add(&mut self, vector: &[f32]) -> Result<u64, IndexError> {
        self.check_dim(vector)?;
        let id = self.len() as u64;
        self.data.extend_from_slice(vector);
        Ok(id)
    }

    /// Highest inner product against `query`, or `None` when empty.
    ///
    /// Ties resolve to the lowest id.
    pub fn search_nearest(&self, query: &[f32]) -> Result<Option<Match>, IndexError> {
        self.check_dim(query)?;
        let mut best: Option<Match> = None;
        for (id, stored) in self.data.chunks_exact(self.dim).enumerate() {
            let score = dot(stored, query);
            if best.map_or(true, |b| score > b.score) {
                best = Some(Match {
                    score,
                    id: id as u64,
                });
            }
        }
        Ok(best)
    }

    /// Vector stored under `id`.
    pub fn get(&self, id: u64) -> Option<&[f32]> {
        let start = usize::try_from(id).ok()?.checked_mul(self.dim)?;
        self.data.get(start..start.checked_add(self.dim)?)
    }

    fn check_dim(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dim || self.dim == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        Ok(())
    }
}
