//! Flat (unindexed) collection with exhaustive cosine ranking.
//!
//! Vectors are stored unencrypted in insertion order and every search
//! scores all of them. This gives:
//! - exact results with a deterministic tie order
//! - no build or maintenance cost
//! - O(n) search, suitable where spatial pruning is not needed

use crate::distance::cosine_similarity;
use crate::error::{Error, Result};
use crate::registry::TopicIndex;
use crate::vector::{Vector, VectorId};

/// A single ranked match.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    /// The matched vector.
    pub vector: Vector,
    /// Cosine similarity to the query (higher = more similar).
    pub similarity: f32,
}

impl SimilarityResult {
    /// Identifier of the matched vector.
    #[inline]
    pub fn id(&self) -> &str {
        self.vector.id()
    }
}

/// An append-only vector list searched by brute-force cosine similarity.
///
/// # Example
///
/// ```
/// use sealdb_core::{FlatCollection, Vector};
///
/// let mut collection = FlatCollection::new(3);
/// collection.insert(Vector::new("x", &[1.0, 0.0, 0.0])).unwrap();
/// collection.insert(Vector::new("y", &[0.0, 1.0, 0.0])).unwrap();
/// collection.insert(Vector::new("xy", &[0.9, 0.1, 0.0])).unwrap();
///
/// let results = collection.search(&[1.0, 0.0, 0.0], 2).unwrap();
/// assert_eq!(results[0].id(), "x");
/// assert_eq!(results[1].id(), "xy");
/// ```
#[derive(Debug, Clone)]
pub struct FlatCollection {
    dimension: usize,
    vectors: Vec<Vector>,
    /// Identifier to position in `vectors`.
    positions: TopicIndex<usize>,
}

impl FlatCollection {
    /// Creates an empty collection for vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self::with_capacity(dimension, 0)
    }

    pub fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::with_capacity(capacity),
            positions: TopicIndex::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Appends a vector.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The vector dimension doesn't match the collection dimension.
    /// - The vector has a non-finite coordinate or is all zeros, since its
    ///   cosine similarity would be undefined.
    /// - A vector with the same identifier already exists.
    pub fn insert(&mut self, vector: Vector) -> Result<()> {
        vector.validate(self.dimension)?;

        if vector.norm() == 0.0 {
            return Err(Error::InvalidInput(format!(
                "vector {} has zero magnitude",
                vector.id()
            )));
        }

        let position = self.vectors.len();
        self.positions
            .add(vector.id(), position)
            .map_err(|_| Error::DuplicateId(vector.id().to_string()))?;
        self.vectors.push(vector);

        Ok(())
    }

    /// Gets a vector by identifier.
    pub fn get(&self, id: &str) -> Option<&Vector> {
        self.positions.get(id).map(|&pos| &self.vectors[pos])
    }

    /// Returns the `top_k` vectors most similar to `query`.
    ///
    /// Results are sorted by non-increasing cosine similarity; equal
    /// similarities keep insertion order. The result length is
    /// `min(top_k, len())`.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if `query` has the wrong length.
    /// - [`Error::InvalidInput`] if `query` has zero magnitude or a
    ///   non-finite coordinate.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidInput(
                "query has a non-finite coordinate".into(),
            ));
        }
        if query.iter().all(|&x| x == 0.0) {
            return Err(Error::InvalidInput("query has zero magnitude".into()));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, v)| cosine_similarity(query, v.as_slice()).map(|s| (pos, s)))
            .collect::<Result<_>>()?;

        // Stable sort, descending: ties keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(pos, similarity)| SimilarityResult {
                vector: self.vectors[pos].clone(),
                similarity,
            })
            .collect())
    }

    /// Iterates over stored vectors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Vector> + '_ {
        self.vectors.iter()
    }

    /// Returns stored identifiers in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.vectors.iter().map(|v| v.id())
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.positions.clear();
    }
}

impl Extend<Vector> for FlatCollection {
    /// Appends every valid vector, skipping ones that [`insert`](Self::insert)
    /// would reject.
    fn extend<T: IntoIterator<Item = Vector>>(&mut self, iter: T) {
        for vector in iter {
            let id: VectorId = vector.id().to_string();
            if let Err(e) = self.insert(vector) {
                tracing::warn!(id = %id, error = %e, "skipping vector");
            }
        }
    }
}
