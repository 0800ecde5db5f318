//! Immutable corpus of indexed vectors.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AnnflowError, Result};
use crate::vector::VectorId;
use crate::vector::core::vector::Vector;
use crate::vector::io;

/// The corpus of vectors an index is built from.
///
/// Ids are dense and follow insertion order. The storage is shared, so
/// cloning a store is cheap and every clone sees the same vectors; nothing
/// can mutate a store once it has been created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStore {
    dimension: usize,
    vectors: Arc<[Vector]>,
}

impl VectorStore {
    /// Build a store from in-memory vectors.
    ///
    /// The dimension is taken from the first vector; an empty input yields
    /// an empty store of dimension 0.
    pub fn from_vectors(vectors: Vec<Vector>) -> Result<Self> {
        let dimension = vectors.first().map(Vector::dimension).unwrap_or(0);
        Self::with_dimension(dimension, vectors)
    }

    /// Build a store whose vectors must all have `dimension` components.
    pub fn with_dimension(dimension: usize, vectors: Vec<Vector>) -> Result<Self> {
        for (id, vector) in vectors.iter().enumerate() {
            if vector.dimension() != dimension {
                return Err(AnnflowError::format(format!(
                    "vector {id} has dimension {}, expected {dimension}",
                    vector.dimension()
                )));
            }
            if !vector.is_valid() {
                return Err(AnnflowError::format(format!(
                    "vector {id} contains invalid values (NaN or infinity)"
                )));
            }
        }

        Ok(Self {
            dimension,
            vectors: vectors.into(),
        })
    }

    /// Load every vector from an `.fvecs` file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read(path, None)
    }

    /// Load at most `limit` vectors from an `.fvecs` file.
    pub fn load_limit<P: AsRef<Path>>(path: P, limit: usize) -> Result<Self> {
        Self::read(path, Some(limit))
    }

    fn read<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let vectors = io::read_fvecs(path, limit)?;
        let store = Self::from_vectors(vectors)?;
        log::info!(
            "loaded {} vectors of dimension {} from {}",
            store.size(),
            store.dimension(),
            path.display()
        );
        Ok(store)
    }

    /// Get the vector stored under `id`.
    pub fn get(&self, id: VectorId) -> Result<&Vector> {
        self.vectors.get(id).ok_or_else(|| {
            AnnflowError::not_found(format!(
                "vector id {id} is out of range (store size {})",
                self.vectors.len()
            ))
        })
    }

    /// Number of stored vectors.
    pub fn size(&self) -> usize {
        self.vectors.len()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the store holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimension shared by every stored vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// All vectors in id order.
    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }

    /// Iterate over `(id, vector)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (VectorId, &Vector)> {
        self.vectors.iter().enumerate()
    }

    /// A new store holding L2-normalized copies of these vectors.
    pub fn normalized(&self) -> Self {
        let mut vectors = self.vectors.to_vec();
        Vector::normalize_batch_parallel(&mut vectors);
        Self {
            dimension: self.dimension,
            vectors: vectors.into(),
        }
    }

    pub(crate) fn row(&self, id: VectorId) -> &[f32] {
        &self.vectors[id].data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_round_trips() {
        let input = vec![
            Vector::new(vec![0.0, 1.0]),
            Vector::new(vec![2.0, 3.0]),
            Vector::new(vec![4.0, 5.0]),
        ];
        let store = VectorStore::from_vectors(input.clone()).unwrap();

        assert_eq!(store.size(), 3);
        assert_eq!(store.dimension(), 2);
        for (id, vector) in input.iter().enumerate() {
            assert_eq!(store.get(id).unwrap(), vector);
        }
    }

    #[test]
    fn test_get_out_of_range() {
        let store = VectorStore::from_vectors(vec![Vector::new(vec![1.0])]).unwrap();
        assert!(matches!(store.get(1), Err(AnnflowError::NotFound(_))));
    }

    #[test]
    fn test_inconsistent_dimension_rejected() {
        let result = VectorStore::from_vectors(vec![
            Vector::new(vec![1.0, 2.0]),
            Vector::new(vec![1.0]),
        ]);
        assert!(matches!(result, Err(AnnflowError::Format(_))));
    }

    #[test]
    fn test_clone_shares_storage() {
        let store = VectorStore::from_vectors(vec![Vector::new(vec![1.0])]).unwrap();
        let clone = store.clone();
        assert!(std::ptr::eq(store.vectors(), clone.vectors()));
    }

    #[test]
    fn test_normalized_leaves_original() {
        let store = VectorStore::from_vectors(vec![Vector::new(vec![3.0, 4.0])]).unwrap();
        let normalized = store.normalized();
        assert_eq!(store.get(0).unwrap().data, vec![3.0, 4.0]);
        assert!((normalized.get(0).unwrap().norm() - 1.0).abs() < 1e-6);
    }
}
