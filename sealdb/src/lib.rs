//! # SealDB
//!
//! **Nearest-neighbor search over vectors kept encrypted at rest.**
//!
//! SealDB keeps vectors in an in-memory k-d tree whose node payloads are
//! sealed with AES-256-GCM. Each search decrypts the nodes it visits, so:
//!
//! - **Tampering is detected** — a modified payload fails authentication and
//!   the query aborts with a crypto error
//! - **Results are exact** — the tree search returns the true Euclidean nearest
//!   neighbor, with ties going to the most recently inserted vector
//! - **Shape stays balanced** — inserts trigger periodic rebuilds into median-split form
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Encrypted k-d tree** | Exact nearest neighbor, sealed node payloads |
//! | **Flat collection** | Exhaustive cosine-similarity top-k ranking |
//! | **HNSW backend** | Approximate k-NN behind a pluggable trait |
//! | **Topic registry** | Unique-key registry rejecting duplicates |
//! | **Async API** | Tokio-compatible async operations (feature flag) |
//!
//! ## Quick Start
//!
//! ### Encrypted Index
//!
//! ```rust
//! use sealdb::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let index = EncryptedIndex::new(Key::generate(), 3, 100)?;
//!
//!     index.insert(Vector::new("v1", &[1.1, 2.2, 3.3]))?;
//!     index.insert(Vector::new("v2", &[2.0, 3.0, 4.0]))?;
//!     index.insert(Vector::new("v3", &[3.0, 4.0, 5.0]))?;
//!
//!     // v2 and v3 are equally close; the later insert wins
//!     let hit = index.nearest(&[2.5, 3.5, 4.5])?;
//!     assert_eq!(hit.vector.id(), "v3");
//!     Ok(())
//! }
//! ```
//!
//! ### Flat Similarity Search
//!
//! ```rust
//! use sealdb::prelude::*;
//!
//! let mut collection = FlatCollection::new(3);
//! collection.insert(Vector::new("a", &[1.0, 0.0, 0.0])).unwrap();
//! collection.insert(Vector::new("b", &[0.9, 0.1, 0.0])).unwrap();
//! collection.insert(Vector::new("c", &[0.0, 0.0, 1.0])).unwrap();
//!
//! let results = collection.search(&[1.0, 0.0, 0.0], 2).unwrap();
//! assert_eq!(results[0].id(), "a");
//! assert_eq!(results[1].id(), "b");
//! ```
//!
//! ### HNSW for Large Datasets
//!
//! ```rust
//! use sealdb::prelude::*;
//!
//! let mut ann = HnswBackend::new(64, HnswConfig::with_m(16));
//!
//! let points: Vec<Vec<f32>> = (0..500)
//!     .map(|i| (0..64).map(|j| ((i * 64 + j) as f32).sin()).collect())
//!     .collect();
//! ann.add_points(&points, 0).unwrap();
//!
//! let matches = ann.search_knn(&points[42], 5, Some(100)).unwrap();
//! assert_eq!(matches[0].label, 42);
//! ```
//!
//! ## Crate Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | Enables `AsyncEncryptedIndex` for tokio compatibility |
//!
//! ```toml
//! [dependencies]
//! sealdb = { version = "0.1", features = ["async"] }
//! ```
//!
//! ## Architecture
//!
//! - **`sealdb-core`** — Core library with no async runtime dependency
//! - **`sealdb`** — Main crate that re-exports everything
//!
//! ## Logging
//!
//! The library emits [`tracing`](https://docs.rs/tracing) events (rebuilds at
//! `debug`, per-insert detail at `trace`, skipped or failed items at `warn`).
//! Install any subscriber to see them.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](crate::Result), which uses
//! the [`Error`] enum for error types.
//!
//! ## Thread Safety
//!
//! - [`EncryptedIndex`] uses an internal `RwLock`; share it with `Arc`
//! - [`KdTree`], [`FlatCollection`], [`HnswBackend`] and [`TopicIndex`] are
//!   not synchronized; wrap them yourself

// Re-export everything from core
pub use sealdb_core::*;
