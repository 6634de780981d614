//! Vector types and operations for SealDB.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unique identifier for a vector within a collection.
pub type VectorId = String;

/// An identified, dense vector of floating-point values.
///
/// Vectors are immutable once inserted into an index; to change one,
/// insert a replacement under a new identifier or rebuild the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    id: VectorId,
    data: Vec<f32>,
}

impl Vector {
    /// Creates a new vector from an identifier and a slice of f32 values.
    ///
    /// # Example
    ///
    /// ```
    /// use sealdb_core::Vector;
    ///
    /// let v = Vector::new("doc-1", &[1.0, 2.0, 3.0]);
    /// assert_eq!(v.id(), "doc-1");
    /// assert_eq!(v.dimension(), 3);
    /// ```
    #[inline]
    pub fn new(id: impl Into<VectorId>, data: &[f32]) -> Self {
        Self {
            id: id.into(),
            data: data.to_vec(),
        }
    }

    /// Creates a vector from an owned `Vec<f32>`.
    #[inline]
    pub fn from_vec(id: impl Into<VectorId>, data: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Returns the vector's identifier.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the dimension (length) of the vector.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Returns a slice view of the vector data.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns true if the vector has zero elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Computes the L2 (Euclidean) norm of the vector.
    #[inline]
    pub fn norm(&self) -> f64 {
        crate::distance::norm(&self.data)
    }

    /// Checks that the vector has `expected` finite coordinates.
    pub fn validate(&self, expected: usize) -> Result<()> {
        if self.data.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                got: self.data.len(),
            });
        }
        if let Some(pos) = self.data.iter().position(|x| !x.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "vector {} has a non-finite coordinate at index {}",
                self.id, pos
            )));
        }
        Ok(())
    }

    /// Consumes the vector and returns its identifier and data.
    #[inline]
    pub fn into_parts(self) -> (VectorId, Vec<f32>) {
        (self.id, self.data)
    }
}

impl AsRef<[f32]> for Vector {
    fn as_ref(&self) -> &[f32] {
        &self.data
    }
}

impl std::ops::Index<usize> for Vector {
    type Output = f32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}
