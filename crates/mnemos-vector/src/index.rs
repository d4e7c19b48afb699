//! Exact brute-force similarity index.
//!
//! Scores are raw inner products. Cosine similarity is obtained by
//! normalizing stored and query vectors before they reach the index (see
//! [`crate::embedding::normalize`]); the index itself never rescales.
//!
//! Search is O(n * D). `build` and `search` are the seam where an
//! approximate structure could later be swapped in.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, info};

use mnemos_core::error::{MnemosError, Result};
use mnemos_storage::MemoryStore;

/// A single hit returned from a similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    /// 0-based position shared with the originating [`MemoryStore`].
    pub position: usize,
    /// Inner product of the query with the indexed vector.
    pub score: f32,
}

/// Read-only view over a fixed set of equal-length vectors.
///
/// Vectors are held row-major in one contiguous buffer and addressed by
/// position. Any change to the underlying store requires a full rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl SimilarityIndex {
    /// Build an index over `vectors`, preserving their order.
    ///
    /// Fails with `EmptyInput` when there are no vectors (or they have no
    /// components) and with `DimensionMismatch` when lengths differ.
    pub fn build<'a, I>(vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut vectors = vectors.into_iter();
        let first = vectors.next().ok_or(MnemosError::EmptyInput)?;
        if first.is_empty() {
            return Err(MnemosError::EmptyInput);
        }

        let dimension = first.len();
        let mut data = first.to_vec();
        for vector in vectors {
            if vector.len() != dimension {
                return Err(MnemosError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        let index = Self { dimension, data };
        info!(count = index.len(), dimension, "Built similarity index");
        Ok(index)
    }

    /// Build an index over every vector of `store`, position for position.
    ///
    /// A store that is empty but already knows its dimension yields an empty
    /// index of that dimension; a store with no dimension at all is
    /// `EmptyInput`.
    pub fn from_store(store: &MemoryStore) -> Result<Self> {
        match store.dimension() {
            Some(dimension) if store.is_empty() && dimension > 0 => {
                info!(dimension, "Built empty similarity index");
                Ok(Self {
                    dimension,
                    data: Vec::new(),
                })
            }
            Some(_) => Self::build(store.vectors()),
            None => Err(MnemosError::EmptyInput),
        }
    }

    /// Reassemble an index from a dimension and a flat row-major buffer.
    pub(crate) fn from_raw(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(MnemosError::EmptyInput);
        }
        if data.len() % dimension != 0 {
            return Err(MnemosError::DimensionMismatch {
                expected: dimension,
                actual: data.len() % dimension,
            });
        }
        Ok(Self { dimension, data })
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The indexed vector at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end)
    }

    /// Flat row-major view of every indexed vector.
    pub fn raw_vectors(&self) -> &[f32] {
        &self.data
    }

    /// Return the `min(k, len)` best-scoring positions for `query`.
    ///
    /// Results are ordered by descending score; equal scores are ordered by
    /// ascending position. A NaN score ranks below every number.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(MnemosError::InvalidK(k));
        }
        if query.len() != self.dimension {
            return Err(MnemosError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() {
            return Err(MnemosError::EmptyInput);
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| SearchHit {
                position,
                score: inner_product(query, vector),
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_unstable_by(rank);

        debug!(k, returned = hits.len(), indexed = self.len(), "Similarity search");
        Ok(hits)
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Total order over hits: best score first, then lowest position.
fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    let key = |s: f32| if s.is_nan() { f32::NEG_INFINITY } else { s };
    key(b.score)
        .partial_cmp(&key(a.score))
        .unwrap_or(Ordering::Equal)
        .then(a.position.cmp(&b.position))
}
