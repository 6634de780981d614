//! Thread-safe encrypted nearest-neighbor index.
//!
//! An [`EncryptedIndex`] combines the k-d tree with:
//! - a direct identifier → node lookup table
//! - the symmetric key used to seal and open node payloads
//! - an insertions-since-rebuild counter driving automatic rebalancing
//!
//! All of it sits behind one read-write lock. Writers (insert, rebuild) hold
//! the exclusive guard for their whole duration; readers (nearest, lookup)
//! hold the shared guard for their whole traversal, including every
//! decryption along the search path. No operation takes the guard twice.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::cipher::Key;
use crate::error::{Error, Result};
use crate::index::kdtree::{KdNode, KdTree, NodeId};
use crate::registry::TopicIndex;
use crate::vector::{Vector, VectorId};

/// Configuration for an encrypted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Dimensionality of vectors.
    pub dimension: usize,
    /// Expected number of vectors, used to pre-size storage.
    #[serde(default)]
    pub capacity_hint: usize,
    /// Rebuild once more than `rebuild_ratio × len` vectors were inserted
    /// since the last rebuild.
    #[serde(default = "default_rebuild_ratio")]
    pub rebuild_ratio: f64,
    /// Lower bound on the insert count that triggers a rebuild, so small
    /// trees are not rebuilt on every insert.
    #[serde(default = "default_min_rebuild_inserts")]
    pub min_rebuild_inserts: usize,
    /// Whether inserts trigger rebuilds automatically.
    #[serde(default = "default_auto_rebuild")]
    pub auto_rebuild: bool,
}

fn default_rebuild_ratio() -> f64 {
    0.5
}

fn default_min_rebuild_inserts() -> usize {
    32
}

fn default_auto_rebuild() -> bool {
    true
}

impl IndexConfig {
    /// Creates a config with the given dimension and default rebuild policy.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            capacity_hint: 0,
            rebuild_ratio: default_rebuild_ratio(),
            min_rebuild_inserts: default_min_rebuild_inserts(),
            auto_rebuild: default_auto_rebuild(),
        }
    }

    /// Sets the expected number of vectors. Chainable.
    pub fn with_capacity_hint(mut self, capacity: usize) -> Self {
        self.capacity_hint = capacity;
        self
    }

    /// Sets the rebuild ratio and minimum. Chainable.
    pub fn with_rebuild_policy(mut self, ratio: f64, min_inserts: usize) -> Self {
        self.rebuild_ratio = ratio;
        self.min_rebuild_inserts = min_inserts;
        self
    }

    /// Enables or disables automatic rebuilds. Chainable.
    pub fn with_auto_rebuild(mut self, enabled: bool) -> Self {
        self.auto_rebuild = enabled;
        self
    }

    /// Insert count above which a tree of `len` vectors is rebuilt.
    pub fn rebuild_threshold(&self, len: usize) -> usize {
        ((self.rebuild_ratio * len as f64) as usize).max(self.min_rebuild_inserts)
    }

    fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidInput("dimension must be positive".into()));
        }
        if !self.rebuild_ratio.is_finite() || self.rebuild_ratio < 0.0 {
            return Err(Error::InvalidInput(format!(
                "rebuild ratio must be a non-negative number, got {}",
                self.rebuild_ratio
            )));
        }
        Ok(())
    }
}

/// Result of a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// The closest stored vector.
    pub vector: Vector,
    /// Euclidean distance from the query. Finite whenever the query and
    /// stored coordinates are.
    pub distance: f64,
}

/// Everything guarded by the index lock.
#[derive(Debug)]
struct TreeState {
    tree: KdTree,
    lookup: TopicIndex<NodeId>,
    inserts_since_rebuild: usize,
    next_sequence: u64,
}

impl TreeState {
    fn empty(config: &IndexConfig) -> Self {
        Self {
            tree: KdTree::with_capacity(config.dimension, config.capacity_hint),
            lookup: TopicIndex::with_capacity(config.capacity_hint),
            inserts_since_rebuild: 0,
            next_sequence: 0,
        }
    }
}

/// Builds the identifier table for every node of `tree`.
fn lookup_for(tree: &KdTree) -> Result<TopicIndex<NodeId>> {
    let mut lookup = TopicIndex::with_capacity(tree.len());
    for (id, node) in tree.nodes() {
        lookup
            .add(node.vector().id(), id)
            .map_err(|_| Error::DuplicateId(node.vector().id().to_string()))?;
    }
    Ok(lookup)
}

/// A nearest-neighbor index whose node payloads are encrypted at rest.
///
/// The index is `Send + Sync`; share it between threads with `Arc`.
///
/// # Example
///
/// ```
/// use sealdb_core::{EncryptedIndex, Key, Vector};
///
/// let index = EncryptedIndex::new(Key::generate(), 3, 100).unwrap();
/// index.insert(Vector::new("v1", &[1.1, 2.2, 3.3])).unwrap();
/// index.insert(Vector::new("v2", &[2.0, 3.0, 4.0])).unwrap();
///
/// let hit = index.nearest(&[2.1, 3.1, 4.1]).unwrap();
/// assert_eq!(hit.vector.id(), "v2");
/// ```
pub struct EncryptedIndex {
    config: IndexConfig,
    key: Key,
    state: RwLock<TreeState>,
}

impl std::fmt::Debug for EncryptedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedIndex")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl EncryptedIndex {
    /// Creates an empty index.
    ///
    /// `max_elements` only pre-sizes storage; the index grows past it.
    pub fn new(key: Key, dimension: usize, max_elements: usize) -> Result<Self> {
        Self::with_config(key, IndexConfig::new(dimension).with_capacity_hint(max_elements))
    }

    /// Creates an empty index from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero dimension or a negative or
    /// non-finite rebuild ratio.
    pub fn with_config(key: Key, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let state = TreeState::empty(&config);
        Ok(Self {
            config,
            key,
            state: RwLock::new(state),
        })
    }

    /// Creates an index holding `vectors` in a balanced tree.
    ///
    /// Vectors are sequenced in input order, so later entries win distance
    /// ties. Fails without building anything if any vector is invalid or two
    /// share an identifier.
    pub fn build(key: Key, config: IndexConfig, vectors: Vec<Vector>) -> Result<Self> {
        config.validate()?;

        let mut seen = TopicIndex::with_capacity(vectors.len());
        for vector in &vectors {
            seen.add(vector.id(), ())
                .map_err(|_| Error::DuplicateId(vector.id().to_string()))?;
        }

        let tree = KdTree::build(vectors, config.dimension, &key)?;
        let lookup = lookup_for(&tree)?;
        debug!(len = tree.len(), depth = tree.depth(), "built index");

        let state = TreeState {
            next_sequence: tree.len() as u64,
            tree,
            lookup,
            inserts_since_rebuild: 0,
        };
        Ok(Self {
            config,
            key,
            state: RwLock::new(state),
        })
    }

    /// Inserts a vector.
    ///
    /// May trigger an automatic rebuild within the same exclusive section.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateId`] if the identifier is already indexed. The
    ///   existing entry is left unchanged.
    /// - [`Error::DimensionMismatch`] for an empty or wrong-length vector.
    /// - [`Error::InvalidInput`] for a non-finite coordinate.
    /// - [`Error::Crypto`] if sealing fails.
    pub fn insert(&self, vector: Vector) -> Result<()> {
        let mut state = self.state.write();
        self.insert_locked(&mut state, vector)?;

        if self.rebuild_due(&state) {
            if let Err(e) = self.rebuild_locked(&mut state) {
                // The insert stands; the counter is kept so the next insert retries.
                warn!(error = %e, "automatic rebuild failed; keeping current tree");
            }
        }

        Ok(())
    }

    /// Inserts each vector in turn, continuing past failures.
    ///
    /// Every vector is inserted atomically on its own; the batch as a whole
    /// is not. Successful vectors stay inserted even when others fail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Batch`] listing each failed identifier with its
    /// error, in input order.
    pub fn insert_batch(&self, vectors: Vec<Vector>) -> Result<()> {
        let total = vectors.len();
        let mut failures: Vec<(VectorId, Error)> = Vec::new();

        for vector in vectors {
            let id = vector.id().to_string();
            if let Err(e) = self.insert(vector) {
                warn!(id = %id, error = %e, "batch insert item failed");
                failures.push((id, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Batch { total, failures })
        }
    }

    /// Rebuilds the tree into balanced form and resets the insert counter.
    ///
    /// The current tree stays in place until the new one is complete, so a
    /// failed rebuild leaves the index unchanged.
    pub fn rebuild(&self) -> Result<()> {
        let mut state = self.state.write();
        self.rebuild_locked(&mut state)
    }

    /// Finds the stored vector closest to `query` by Euclidean distance.
    ///
    /// Exact ties resolve to the most recently inserted vector.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the index is empty.
    /// - [`Error::DimensionMismatch`] / [`Error::InvalidInput`] for a bad query.
    /// - [`Error::Crypto`] if a node on the search path fails to decrypt;
    ///   the query is abandoned rather than answered from a partial search.
    pub fn nearest(&self, query: &[f32]) -> Result<Neighbor> {
        let state = self.state.read();
        let (id, dist_sq) = state
            .tree
            .nearest(query, &self.key)?
            .ok_or_else(|| Error::NotFound("index is empty".into()))?;
        let node = state
            .tree
            .node(id)
            .ok_or_else(|| Error::NotFound(format!("node {}", id)))?;

        Ok(Neighbor {
            vector: node.vector().clone(),
            distance: dist_sq.sqrt(),
        })
    }

    /// Returns a snapshot of the node holding `id`, bypassing the tree.
    pub fn lookup(&self, id: &str) -> Result<KdNode> {
        let state = self.state.read();
        state
            .lookup
            .get(id)
            .and_then(|&node| state.tree.node(node))
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Returns the vector stored under `id`.
    pub fn get(&self, id: &str) -> Result<Vector> {
        self.lookup(id).map(|node| node.vector().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().lookup.contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().tree.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Current number of tree levels.
    pub fn depth(&self) -> usize {
        self.state.read().tree.depth()
    }

    pub fn inserts_since_rebuild(&self) -> usize {
        self.state.read().inserts_since_rebuild
    }

    /// Snapshot of all vectors in in-order tree sequence.
    pub fn vectors(&self) -> Vec<Vector> {
        let state = self.state.read();
        state
            .tree
            .in_order()
            .into_iter()
            .filter_map(|id| state.tree.node(id))
            .map(|node| node.vector().clone())
            .collect()
    }

    /// Checks that the lookup table and the tree describe the same nodes:
    /// every reachable node is registered under its own identifier, and
    /// every registered identifier points at a reachable node.
    pub fn is_consistent(&self) -> bool {
        let state = self.state.read();
        let reachable = state.tree.in_order();

        reachable.len() == state.tree.len()
            && state.lookup.len() == reachable.len()
            && reachable.iter().all(|&id| {
                state
                    .tree
                    .node(id)
                    .is_some_and(|node| state.lookup.get(node.vector().id()) == Some(&id))
            })
    }

    fn insert_locked(&self, state: &mut TreeState, vector: Vector) -> Result<()> {
        if state.lookup.contains(vector.id()) {
            return Err(Error::DuplicateId(vector.id().to_string()));
        }

        let id = vector.id().to_string();
        let sequence = state.next_sequence;
        let node = state.tree.insert(vector, sequence, &self.key)?;
        state
            .lookup
            .add(id.as_str(), node)
            .map_err(|_| Error::DuplicateId(id.clone()))?;

        state.next_sequence += 1;
        state.inserts_since_rebuild += 1;
        trace!(id = %id, node, "inserted vector");
        Ok(())
    }

    fn rebuild_due(&self, state: &TreeState) -> bool {
        self.config.auto_rebuild
            && state.inserts_since_rebuild > self.config.rebuild_threshold(state.tree.len())
    }

    fn rebuild_locked(&self, state: &mut TreeState) -> Result<()> {
        let before = state.tree.depth();
        debug!(
            len = state.tree.len(),
            depth = before,
            inserts = state.inserts_since_rebuild,
            "rebuilding tree"
        );

        let entries: Vec<(u64, Vector)> = state
            .tree
            .in_order()
            .into_iter()
            .filter_map(|id| state.tree.node(id))
            .map(|node| (node.sequence(), node.vector().clone()))
            .collect();

        let tree = KdTree::build_sequenced(entries, self.config.dimension, &self.key)?;
        let lookup = lookup_for(&tree)?;

        state.tree = tree;
        state.lookup = lookup;
        state.inserts_since_rebuild = 0;

        debug!(depth_before = before, depth_after = state.tree.depth(), "rebuild complete");
        Ok(())
    }
}

// Async API when tokio feature is enabled
#[cfg(feature = "async")]
mod async_api {
    use super::*;
    use std::sync::Arc;

    fn join_error(e: tokio::task::JoinError) -> Error {
        Error::TaskFailed(e.to_string())
    }

    /// Async wrapper for [`EncryptedIndex`].
    ///
    /// Each call runs on tokio's blocking pool, so long decrypting searches
    /// and rebuilds do not stall the async executor.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use sealdb_core::{AsyncEncryptedIndex, EncryptedIndex, Key, Vector};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let index = EncryptedIndex::new(Key::generate(), 3, 0).unwrap();
    ///     let index = AsyncEncryptedIndex::from_sync(index);
    ///
    ///     index.insert(Vector::new("a", &[1.0, 2.0, 3.0])).await.unwrap();
    ///     let hit = index.nearest(vec![1.0, 2.0, 3.0]).await.unwrap();
    /// }
    /// ```
    #[derive(Clone, Debug)]
    pub struct AsyncEncryptedIndex {
        inner: Arc<EncryptedIndex>,
    }

    impl AsyncEncryptedIndex {
        /// Wraps an existing index.
        pub fn from_sync(index: EncryptedIndex) -> Self {
            Self {
                inner: Arc::new(index),
            }
        }

        pub async fn insert(&self, vector: Vector) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.insert(vector))
                .await
                .map_err(join_error)?
        }

        pub async fn insert_batch(&self, vectors: Vec<Vector>) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.insert_batch(vectors))
                .await
                .map_err(join_error)?
        }

        pub async fn rebuild(&self) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.rebuild())
                .await
                .map_err(join_error)?
        }

        pub async fn nearest(&self, query: Vec<f32>) -> Result<Neighbor> {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.nearest(&query))
                .await
                .map_err(join_error)?
        }

        pub async fn get(&self, id: impl Into<VectorId>) -> Result<Vector> {
            let inner = Arc::clone(&self.inner);
            let id = id.into();
            tokio::task::spawn_blocking(move || inner.get(&id))
                .await
                .map_err(join_error)?
        }

        pub fn len(&self) -> usize {
            self.inner.len()
        }

        pub fn is_empty(&self) -> bool {
            self.inner.is_empty()
        }

        /// Returns reference to inner sync index.
        pub fn inner(&self) -> &EncryptedIndex {
            &self.inner
        }
    }
}

#[cfg(feature = "async")]
pub use async_api::AsyncEncryptedIndex;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{SealedPayload, KEY_LEN};
    use std::sync::Arc;
    use std::thread;

    fn key() -> Key {
        Key::new([9u8; KEY_LEN])
    }

    fn scenario_index() -> EncryptedIndex {
        let index = EncryptedIndex::new(key(), 3, 16).unwrap();
        index.insert(Vector::new("v1", &[1.1, 2.2, 3.3])).unwrap();
        index.insert(Vector::new("v2", &[2.0, 3.0, 4.0])).unwrap();
        index.insert(Vector::new("v3", &[3.0, 4.0, 5.0])).unwrap();
        index
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EncryptedIndex>();
    }

    #[test]
    fn test_new_index() {
        let index = EncryptedIndex::new(key(), 384, 1000).unwrap();
        assert_eq!(index.dimension(), 384);
        assert!(index.is_empty());
        assert_eq!(index.inserts_since_rebuild(), 0);
        assert_eq!(index.depth(), 0);
    }

    #[test]
    fn test_new_rejects_zero_dimension() {
        assert!(matches!(
            EncryptedIndex::new(key(), 0, 0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_new_rejects_bad_ratio() {
        let config = IndexConfig::new(3).with_rebuild_policy(f64::NAN, 1);
        assert!(matches!(
            EncryptedIndex::with_config(key(), config),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_build_balanced() {
        let vectors: Vec<Vector> = (0..15)
            .map(|i| Vector::new(format!("v{}", i), &[i as f32, (15 - i) as f32]))
            .collect();
        let index = EncryptedIndex::build(key(), IndexConfig::new(2), vectors).unwrap();

        assert_eq!(index.len(), 15);
        assert_eq!(index.depth(), 4);
        assert_eq!(index.inserts_since_rebuild(), 0);
        assert!(index.is_consistent());
        assert_eq!(index.nearest(&[7.2, 7.9]).unwrap().vector.id(), "v7");

        // sequences continue after the built entries
        index.insert(Vector::new("late", &[7.0, 8.0])).unwrap();
        assert_eq!(index.nearest(&[7.0, 8.0]).unwrap().vector.id(), "late");
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let vectors = vec![
            Vector::new("a", &[0.0, 0.0]),
            Vector::new("a", &[1.0, 1.0]),
        ];
        assert!(matches!(
            EncryptedIndex::build(key(), IndexConfig::new(2), vectors),
            Err(Error::DuplicateId(ref id)) if id == "a"
        ));
    }

    #[test]
    fn test_scenario_tie_goes_to_latest_insert() {
        let index = scenario_index();
        let hit = index.nearest(&[2.5, 3.5, 4.5]).unwrap();
        assert_eq!(hit.vector.id(), "v3");
        assert!((hit.distance - 0.866_025_4).abs() < 1e-5);
    }

    #[test]
    fn test_scenario_tie_survives_rebuild() {
        let index = scenario_index();
        index.rebuild().unwrap();
        let hit = index.nearest(&[2.5, 3.5, 4.5]).unwrap();
        assert_eq!(hit.vector.id(), "v3");
    }

    #[test]
    fn test_nearest_exact_match() {
        let index = scenario_index();
        let hit = index.nearest(&[1.1, 2.2, 3.3]).unwrap();
        assert_eq!(hit.vector.id(), "v1");
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn test_nearest_large_magnitudes() {
        let index = EncryptedIndex::new(key(), 1, 0).unwrap();
        index.insert(Vector::new("near", &[1e20])).unwrap();
        index.insert(Vector::new("far", &[3e20])).unwrap();

        let hit = index.nearest(&[0.0]).unwrap();
        assert_eq!(hit.vector.id(), "near");
        assert!(hit.distance.is_finite());
        assert!((hit.distance / 1e20 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_empty() {
        let index = EncryptedIndex::new(key(), 3, 0).unwrap();
        assert!(matches!(
            index.nearest(&[0.0, 0.0, 0.0]),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_nearest_query_dimension_mismatch() {
        let index = scenario_index();
        assert!(matches!(
            index.nearest(&[1.0, 2.0]),
            Err(Error::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_insert_duplicate_keeps_prior_entry() {
        let index = scenario_index();
        let result = index.insert(Vector::new("v2", &[9.0, 9.0, 9.0]));
        assert!(matches!(result, Err(Error::DuplicateId(ref id)) if id == "v2"));

        assert_eq!(index.len(), 3);
        assert_eq!(index.get("v2").unwrap().as_slice(), &[2.0, 3.0, 4.0]);
        assert_eq!(index.inserts_since_rebuild(), 3);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let index = EncryptedIndex::new(key(), 3, 0).unwrap();
        assert!(matches!(
            index.insert(Vector::new("a", &[1.0])),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.insert(Vector::new("b", &[])),
            Err(Error::DimensionMismatch { got: 0, .. })
        ));
        assert!(index.is_empty());
        assert!(!index.contains("a"));
    }

    #[test]
    fn test_lookup() {
        let index = scenario_index();
        let node = index.lookup("v2").unwrap();
        assert_eq!(node.vector().as_slice(), &[2.0, 3.0, 4.0]);
        assert_eq!(node.split_dimension(), 1);
        assert!(!node.sealed().is_empty());

        assert!(matches!(index.lookup("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_payload_is_not_plaintext() {
        let index = scenario_index();
        let node = index.lookup("v1").unwrap();
        let plain: Vec<u8> = [1.1f32, 2.2, 3.3]
            .iter()
            .flat_map(|c| c.to_le_bytes())
            .collect();
        assert!(!node.sealed().as_str().contains(&hex::encode(plain)));
    }

    #[test]
    fn test_rebuild_resets_counter_and_balances() {
        let config = IndexConfig::new(1).with_auto_rebuild(false);
        let index = EncryptedIndex::with_config(key(), config).unwrap();
        for i in 0..64 {
            index
                .insert(Vector::new(format!("v{}", i), &[i as f32]))
                .unwrap();
        }
        assert_eq!(index.depth(), 64);
        assert_eq!(index.inserts_since_rebuild(), 64);

        index.rebuild().unwrap();
        assert_eq!(index.depth(), 7);
        assert_eq!(index.inserts_since_rebuild(), 0);
        assert_eq!(index.len(), 64);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_rebuild_twice_is_idempotent() {
        let index = scenario_index();
        index.rebuild().unwrap();
        let first = index.vectors();
        index.rebuild().unwrap();
        let second = index.vectors();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rebuild_empty() {
        let index = EncryptedIndex::new(key(), 2, 0).unwrap();
        index.rebuild().unwrap();
        assert!(index.is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_auto_rebuild_bounds_depth() {
        let config = IndexConfig::new(1).with_rebuild_policy(0.5, 8);
        let index = EncryptedIndex::with_config(key(), config).unwrap();
        for i in 0..100 {
            index
                .insert(Vector::new(format!("v{}", i), &[i as f32]))
                .unwrap();
        }

        // Rebuilds fire at 9, 19, 39 and 79 vectors.
        assert_eq!(index.inserts_since_rebuild(), 21);
        assert!(index.depth() <= 28, "depth {}", index.depth());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_rebuild_threshold() {
        let config = IndexConfig::new(3);
        assert_eq!(config.rebuild_threshold(0), 32);
        assert_eq!(config.rebuild_threshold(1000), 500);
    }

    #[test]
    fn test_insert_batch_all_ok() {
        let index = EncryptedIndex::new(key(), 2, 0).unwrap();
        index
            .insert_batch(vec![
                Vector::new("a", &[0.0, 0.0]),
                Vector::new("b", &[1.0, 1.0]),
            ])
            .unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_insert_batch_is_best_effort() {
        let index = EncryptedIndex::new(key(), 2, 0).unwrap();
        let result = index.insert_batch(vec![
            Vector::new("a", &[0.0, 0.0]),
            Vector::new("a", &[5.0, 5.0]),
            Vector::new("c", &[1.0]),
            Vector::new("d", &[2.0, 2.0]),
        ]);

        match result {
            Err(Error::Batch { total, failures }) => {
                assert_eq!(total, 4);
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].0, "a");
                assert!(matches!(failures[0].1, Error::DuplicateId(_)));
                assert_eq!(failures[1].0, "c");
                assert!(matches!(failures[1].1, Error::DimensionMismatch { .. }));
            }
            other => panic!("expected batch error, got {:?}", other),
        }

        assert_eq!(index.len(), 2);
        assert!(index.contains("a"));
        assert!(index.contains("d"));
        assert_eq!(index.get("a").unwrap().as_slice(), &[0.0, 0.0]);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_corrupt_node_aborts_query() {
        let index = scenario_index();
        {
            let mut state = index.state.write();
            let root = state.tree.root().unwrap();
            let sealed = state.tree.node(root).unwrap().sealed().as_str().to_string();
            // flip the last hex digit (inside the tag)
            let mut chars: Vec<char> = sealed.chars().collect();
            let last = chars.len() - 1;
            chars[last] = if chars[last] == '0' { '1' } else { '0' };
            state
                .tree
                .replace_sealed(root, SealedPayload::from_hex(chars.into_iter().collect::<String>()));
        }

        assert!(matches!(
            index.nearest(&[2.5, 3.5, 4.5]),
            Err(Error::Crypto(_))
        ));
        // direct lookup does not decrypt
        assert!(index.lookup("v1").is_ok());
    }

    /// Gives the plaintext of `id` one coordinate too many, so the next
    /// rebuild fails validation while the sealed payload stays intact.
    fn break_rebuild(index: &EncryptedIndex, id: &str) {
        let wrong = vec![0.0; index.dimension() + 1];
        let mut state = index.state.write();
        let node = *state.lookup.get(id).unwrap();
        state.tree.replace_vector(node, Vector::from_vec(id, wrong));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_tree() {
        let config = IndexConfig::new(3).with_auto_rebuild(false);
        let index = EncryptedIndex::with_config(key(), config).unwrap();
        for (id, v) in [("v1", [1.1, 2.2, 3.3]), ("v2", [2.0, 3.0, 4.0]), ("v3", [3.0, 4.0, 5.0])] {
            index.insert(Vector::new(id, &v)).unwrap();
        }
        break_rebuild(&index, "v2");

        let depth = index.depth();
        let ids: Vec<String> = index.vectors().iter().map(|v| v.id().to_string()).collect();

        assert!(matches!(
            index.rebuild(),
            Err(Error::DimensionMismatch { expected: 3, got: 4 })
        ));

        assert_eq!(index.depth(), depth);
        assert_eq!(
            index.vectors().iter().map(|v| v.id().to_string()).collect::<Vec<_>>(),
            ids
        );
        assert_eq!(index.inserts_since_rebuild(), 3);
        assert!(index.is_consistent());
        assert_eq!(index.lookup("v3").unwrap().vector().as_slice(), &[3.0, 4.0, 5.0]);
        // sealed payloads are untouched, so search still works
        assert_eq!(index.nearest(&[2.5, 3.5, 4.5]).unwrap().vector.id(), "v3");
    }

    #[test]
    fn test_failed_auto_rebuild_keeps_insert_and_counter() {
        let config = IndexConfig::new(1).with_rebuild_policy(0.0, 2);
        let index = EncryptedIndex::with_config(key(), config).unwrap();
        index.insert(Vector::new("a", &[0.0])).unwrap();
        index.insert(Vector::new("b", &[1.0])).unwrap();
        assert_eq!(index.inserts_since_rebuild(), 2);

        break_rebuild(&index, "a");

        // counter passes the threshold: the rebuild fails, the insert stands
        index.insert(Vector::new("c", &[2.0])).unwrap();
        assert_eq!(index.len(), 3);
        assert!(index.contains("c"));
        assert_eq!(index.inserts_since_rebuild(), 3);
        assert_eq!(index.depth(), 3);
        assert!(index.is_consistent());

        // the next insert retries and fails again
        index.insert(Vector::new("d", &[3.0])).unwrap();
        assert_eq!(index.inserts_since_rebuild(), 4);
        assert_eq!(index.nearest(&[2.9]).unwrap().vector.id(), "d");
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let index = Arc::new(EncryptedIndex::new(key(), 2, 200).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for i in 0..50 {
                        let v = Vector::new(format!("t{}-{}", t, i), &[t as f32, i as f32]);
                        index.insert(v).unwrap();
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for i in 0..50 {
                        match index.nearest(&[1.5, i as f32]) {
                            Ok(hit) => assert!(hit.distance.is_finite()),
                            Err(Error::NotFound(_)) => {}
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        assert_eq!(index.len(), 200);
        assert!(index.is_consistent());
        for t in 0..4 {
            for i in 0..50 {
                let id = format!("t{}-{}", t, i);
                let hit = index.nearest(&[t as f32, i as f32]).unwrap();
                assert_eq!(hit.vector.id(), id);
                assert_eq!(hit.distance, 0.0);
            }
        }
    }

    #[test]
    fn test_config_from_json() {
        let config: IndexConfig = serde_json::from_str(r#"{"dimension": 8}"#).unwrap();
        assert_eq!(config, IndexConfig::new(8));

        let config: IndexConfig = serde_json::from_str(
            r#"{"dimension": 4, "rebuild_ratio": 0.25, "auto_rebuild": false}"#,
        )
        .unwrap();
        assert_eq!(config.rebuild_ratio, 0.25);
        assert!(!config.auto_rebuild);
        assert_eq!(config.min_rebuild_inserts, 32);
    }

    #[cfg(feature = "async")]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_wrapper() {
        let index = AsyncEncryptedIndex::from_sync(EncryptedIndex::new(key(), 2, 0).unwrap());
        index.insert(Vector::new("a", &[0.0, 0.0])).await.unwrap();
        index
            .insert_batch(vec![Vector::new("b", &[3.0, 3.0])])
            .await
            .unwrap();
        index.rebuild().await.unwrap();

        let hit = index.nearest(vec![2.5, 2.5]).await.unwrap();
        assert_eq!(hit.vector.id(), "b");
        assert_eq!(index.get("a").await.unwrap().as_slice(), &[0.0, 0.0]);
        assert_eq!(index.len(), 2);
    }
}
