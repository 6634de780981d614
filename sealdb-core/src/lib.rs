//! # SealDB Core
//!
//! Core library for SealDB, an in-memory nearest-neighbor index whose node
//! payloads are sealed with authenticated encryption.
//!
//! Every vector stored in the k-d tree carries an AES-256-GCM ciphertext of
//! its coordinates. Searches decrypt node payloads along the traversal path,
//! so a tampered node aborts the query instead of silently skewing results.
//!
//! ## Crate Features
//!
//! - `async` - Enables [`AsyncEncryptedIndex`] for tokio-compatible async operations
//!
//! ## Core Types
//!
//! ### Indexes
//!
//! - [`EncryptedIndex`] - Thread-safe k-d tree with sealed nodes and automatic rebalancing
//! - [`KdTree`] - The underlying single-threaded tree
//! - [`FlatCollection`] - Exhaustive cosine-similarity ranking, O(n) search
//! - [`HnswBackend`] - Approximate nearest neighbor behind the [`AnnBackend`] trait
//!
//! ### Crypto
//!
//! - [`Key`] - 256-bit symmetric key
//! - [`SealedPayload`] - Hex-encoded nonce, ciphertext and tag
//!
//! ### Types
//!
//! - [`Vector`] - Identified, owned vector data
//! - [`VectorId`] - Unique string identifier for vectors
//! - [`TopicIndex`] - Unique-key registry with reject-on-duplicate semantics

pub mod cipher;
pub mod distance;
pub mod engine;
pub mod error;
pub mod index;
pub mod registry;
pub mod vector;

// Re-exports for convenient access
pub use cipher::{Key, SealedPayload};
#[cfg(feature = "async")]
pub use engine::AsyncEncryptedIndex;
pub use engine::{EncryptedIndex, IndexConfig, Neighbor};
pub use error::{Error, Result};
pub use index::flat::{FlatCollection, SimilarityResult};
pub use index::hnsw::{HnswBackend, HnswConfig};
pub use index::kdtree::{KdNode, KdTree, NodeId};
pub use index::{AnnBackend, AnnMatch, Label};
pub use registry::TopicIndex;
pub use vector::{Vector, VectorId};

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use sealdb_core::prelude::*;
///
/// let index = EncryptedIndex::new(Key::generate(), 3, 0).unwrap();
/// index.insert(Vector::new("a", &[1.0, 2.0, 3.0])).unwrap();
/// assert_eq!(index.nearest(&[1.0, 2.0, 3.0]).unwrap().vector.id(), "a");
/// ```
pub mod prelude {
    pub use crate::{
        AnnBackend, EncryptedIndex, Error, FlatCollection, HnswBackend, HnswConfig, IndexConfig,
        Key, Neighbor, Result, TopicIndex, Vector, VectorId,
    };
}
