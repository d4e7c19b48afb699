//! Append-only, position-aligned collection of records and their vectors.
//!
//! Vectors live in one contiguous row-major buffer so the similarity index
//! can copy them in a single pass. Position `i` of the record list and row
//! `i` of the buffer always describe the same item.

use std::collections::HashMap;

use tracing::debug;

use mnemos_core::error::{MnemosError, Result};
use mnemos_core::types::Record;

/// Ordered records plus their fixed-dimension vectors.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    dimension: Option<usize>,
    records: Vec<Record>,
    vectors: Vec<f32>,
    positions: HashMap<String, usize>,
}

impl MemoryStore {
    /// Create an empty store whose dimension is taken from the first append.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with a fixed vector dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    /// Build a store from parallel record and vector lists.
    ///
    /// Fails without producing a partial store if the lists differ in
    /// length, any vector has the wrong dimension, or an id repeats.
    pub fn from_parts(records: Vec<Record>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if records.len() != vectors.len() {
            return Err(MnemosError::AlignmentMismatch {
                records: records.len(),
                vectors: vectors.len(),
            });
        }

        let mut store = Self::new();
        if let Some(first) = vectors.first() {
            store.records.reserve(records.len());
            store.vectors.reserve(records.len() * first.len());
        }
        for (record, vector) in records.into_iter().zip(vectors) {
            store.append(record, vector)?;
        }
        Ok(store)
    }

    /// Append a record with its vector, returning the new position.
    ///
    /// Nothing is modified when an error is returned.
    pub fn append(&mut self, record: Record, vector: Vec<f32>) -> Result<usize> {
        if vector.is_empty() {
            return Err(MnemosError::EmptyInput);
        }
        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(MnemosError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        if self.positions.contains_key(record.id()) {
            return Err(MnemosError::DuplicateId(record.id().to_string()));
        }

        let position = self.records.len();
        self.dimension = Some(vector.len());
        self.positions.insert(record.id().to_string(), position);
        self.vectors.extend_from_slice(&vector);
        self.records.push(record);

        debug!(position, "Appended record to memory store");
        Ok(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vector dimension, or `None` for an empty store built without one.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Record and vector at a 0-based position.
    pub fn get(&self, position: usize) -> Result<(&Record, &[f32])> {
        let record = self.records.get(position).ok_or(MnemosError::OutOfRange {
            position,
            len: self.len(),
        })?;
        Ok((record, self.row(position)))
    }

    /// Position of the record with the given id.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// All vectors in insertion order.
    pub fn vectors(&self) -> std::slice::ChunksExact<'_, f32> {
        self.vectors.chunks_exact(self.stride())
    }

    /// The row-major vector buffer (`len() * dimension()` values).
    pub fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// Iterate `(position, record, vector)` in insertion order.
    ///
    /// Each call starts a fresh pass over the store.
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            records: self.records.iter(),
            vectors: self.vectors(),
            position: 0,
        }
    }

    /// True if both stores hold the same records in the same order and every
    /// vector component differs by at most `tolerance`.
    pub fn matches_within(&self, other: &MemoryStore, tolerance: f32) -> bool {
        if self.records != other.records || self.vectors.len() != other.vectors.len() {
            return false;
        }
        if !self.is_empty() && self.dimension != other.dimension {
            return false;
        }
        self.vectors
            .iter()
            .zip(&other.vectors)
            .all(|(a, b)| a.to_bits() == b.to_bits() || (a - b).abs() <= tolerance)
    }

    fn stride(&self) -> usize {
        self.dimension.unwrap_or(1).max(1)
    }

    fn row(&self, position: usize) -> &[f32] {
        let stride = self.stride();
        &self.vectors[position * stride..(position + 1) * stride]
    }
}

impl PartialEq for MemoryStore {
    fn eq(&self, other: &Self) -> bool {
        self.matches_within(other, 0.0)
    }
}

impl<'a> IntoIterator for &'a MemoryStore {
    type Item = (usize, &'a Record, &'a [f32]);
    type IntoIter = Entries<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    records: std::slice::Iter<'a, Record>,
    vectors: std::slice::ChunksExact<'a, f32>,
    position: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (usize, &'a Record, &'a [f32]);

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        let vector = self.vectors.next()?;
        let position = self.position;
        self.position += 1;
        Some((position, record, vector))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for Entries<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: usize) -> Record {
        Record::new(
            format!("conv_{}", i),
            format!("summary {}", i),
            format!("2025-04-0{} 10:00:00", i + 1),
        )
    }

    fn three_item_store() -> MemoryStore {
        MemoryStore::from_parts(
            vec![record(0), record(1), record(2)],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap()
    }

    #[test]
    fn test_append_infers_dimension() {
        let mut store = MemoryStore::new();
        assert_eq!(store.dimension(), None);
        assert_eq!(store.append(record(0), vec![1.0, 2.0, 3.0]).unwrap(), 0);
        assert_eq!(store.dimension(), Some(3));
        assert_eq!(store.append(record(1), vec![4.0, 5.0, 6.0]).unwrap(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_append_dimension_mismatch_is_atomic() {
        let mut store = MemoryStore::new();
        store.append(record(0), vec![1.0, 2.0]).unwrap();

        let err = store.append(record(1), vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            MnemosError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.raw_vectors().len(), 2);
        assert_eq!(store.position_of("conv_1"), None);
    }

    #[test]
    fn test_explicit_dimension_enforced_on_first_append() {
        let mut store = MemoryStore::with_dimension(4);
        let err = store.append(record(0), vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            MnemosError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
        assert!(store.is_empty());
        assert_eq!(store.dimension(), Some(4));
    }

    #[test]
    fn test_append_rejects_empty_vector() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.append(record(0), vec![]),
            Err(MnemosError::EmptyInput)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = MemoryStore::new();
        store.append(record(0), vec![1.0]).unwrap();
        let dup = Record::new("conv_0", "other", "later");
        let err = store.append(dup, vec![2.0]).unwrap_err();
        assert!(matches!(err, MnemosError::DuplicateId(ref id) if id == "conv_0"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().0.summary(), "summary 0");
    }

    #[test]
    fn test_get_and_out_of_range() {
        let store = three_item_store();
        let (rec, vec) = store.get(2).unwrap();
        assert_eq!(rec.id(), "conv_2");
        assert_eq!(vec, &[0.7, 0.7]);

        let err = store.get(3).unwrap_err();
        assert!(matches!(
            err,
            MnemosError::OutOfRange {
                position: 3,
                len: 3
            }
        ));
    }

    #[test]
    fn test_iter_is_ordered_and_restartable() {
        let store = three_item_store();

        let first: Vec<(usize, String)> = store
            .iter()
            .map(|(pos, rec, _)| (pos, rec.id().to_string()))
            .collect();
        assert_eq!(
            first,
            vec![
                (0, "conv_0".to_string()),
                (1, "conv_1".to_string()),
                (2, "conv_2".to_string())
            ]
        );

        assert_eq!(store.iter().len(), 3);
        let second: Vec<&[f32]> = store.iter().map(|(_, _, v)| v).collect();
        assert_eq!(second, vec![&[1.0f32, 0.0][..], &[0.0, 1.0][..], &[0.7, 0.7][..]]);
    }

    #[test]
    fn test_from_parts_alignment_mismatch() {
        let err = MemoryStore::from_parts(vec![record(0), record(1)], vec![vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            MnemosError::AlignmentMismatch {
                records: 2,
                vectors: 1
            }
        ));
    }

    #[test]
    fn test_from_parts_inconsistent_dimensions() {
        let err = MemoryStore::from_parts(
            vec![record(0), record(1)],
            vec![vec![1.0, 2.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, MnemosError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_position_of() {
        let store = three_item_store();
        assert_eq!(store.position_of("conv_1"), Some(1));
        assert_eq!(store.position_of("conv_9"), None);
    }

    #[test]
    fn test_matches_within_tolerance() {
        let a = three_item_store();
        let b = MemoryStore::from_parts(
            vec![record(0), record(1), record(2)],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.70001, 0.7]],
        )
        .unwrap();

        assert_ne!(a, b);
        assert!(a.matches_within(&b, 1e-4));
        assert!(!a.matches_within(&b, 1e-6));
    }

    #[test]
    fn test_empty_stores_compare_equal() {
        assert_eq!(MemoryStore::new(), MemoryStore::with_dimension(8));
    }
}
