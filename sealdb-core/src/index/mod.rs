//! Index structures.
//!
//! - [`kdtree`] - k-d tree with sealed node payloads, the backing structure
//!   of [`EncryptedIndex`](crate::EncryptedIndex)
//! - [`flat`] - unindexed collection with exhaustive cosine ranking
//! - [`hnsw`] - approximate nearest neighbor backend behind [`AnnBackend`]

pub mod flat;
pub mod hnsw;
pub mod kdtree;

use crate::error::{Error, Result};

/// Numeric label addressing a point in an [`AnnBackend`].
pub type Label = u64;

/// A single match returned by [`AnnBackend::search_knn`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnMatch {
    pub label: Label,
    /// Euclidean distance from the query (lower = more similar).
    pub distance: f32,
}

/// Capability contract of an approximate nearest neighbor index.
///
/// Implementations store plaintext points under caller-chosen labels and
/// trade exactness for speed through a tunable search-quality level (the
/// beam width for graph indexes).
pub trait AnnBackend {
    /// Dimensionality of stored points.
    fn dimension(&self) -> usize;

    /// Number of stored points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a single point.
    ///
    /// Fails with `DimensionMismatch` on a wrong-length point and with
    /// `DuplicateId` if the label is taken.
    fn add_point(&mut self, point: &[f32], label: Label) -> Result<()>;

    /// Adds points under consecutive labels starting at `first_label` and
    /// returns the labels used.
    ///
    /// Stops at the first failing point; the points before it stay added.
    /// Running past `Label::MAX` fails with `InvalidInput`.
    fn add_points(&mut self, points: &[Vec<f32>], first_label: Label) -> Result<Vec<Label>> {
        let mut labels = Vec::with_capacity(points.len());
        for (offset, point) in (0u64..).zip(points) {
            let label = first_label.checked_add(offset).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "label range starting at {} overflows after {} points",
                    first_label, offset
                ))
            })?;
            self.add_point(point, label)?;
            labels.push(label);
        }
        Ok(labels)
    }

    /// Returns up to `k` matches sorted by ascending distance.
    ///
    /// `quality` overrides the configured search-quality level for this
    /// query only.
    fn search_knn(&self, query: &[f32], k: usize, quality: Option<usize>) -> Result<Vec<AnnMatch>>;

    /// Sets the default search-quality level.
    fn set_search_quality(&mut self, level: usize);
}
