//! k-d tree whose nodes carry a sealed copy of their coordinates.
//!
//! # Layout
//!
//! Nodes live in an arena (`Vec<KdNode>`) and refer to their children by
//! [`NodeId`]. Every node has at most one parent and the tree is only ever
//! grown by attaching fresh nodes to empty child slots, so there are no
//! shared subtrees and no cycles. Dropping the tree is a flat `Vec` drop.
//!
//! # Algorithms
//!
//! - **Build**: median split. At depth `d` the split dimension is
//!   `d % dimension`; the subset is stably sorted on that coordinate and the
//!   element at `len / 2` becomes the node.
//! - **Insert**: unbalanced descent; strictly-less goes left, everything else
//!   goes right. Skewed input degrades toward a list, which is why the engine
//!   rebuilds periodically.
//! - **Nearest**: branch-and-bound. Each visited node is decrypted to obtain
//!   its reference coordinates. The child on the query's side of the split
//!   hyperplane is searched first; the other child only if the hyperplane is
//!   no farther than the best match so far.
//!
//! All three use explicit work stacks, so very deep (degenerate) trees do not
//! hit the call-depth limit.

use std::cmp::Ordering;

use crate::cipher::{open_coordinates, seal_coordinates, Key, SealedPayload};
use crate::distance::{axis_distance_squared, euclidean_distance_squared};
use crate::error::{Error, Result};
use crate::vector::Vector;

/// Position of a node inside its tree's arena.
pub type NodeId = usize;

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// A node of the k-d tree.
#[derive(Debug, Clone)]
pub struct KdNode {
    vector: Vector,
    sealed: SealedPayload,
    split_dimension: usize,
    /// Insertion order, preserved across rebuilds. Breaks distance ties.
    sequence: u64,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

impl KdNode {
    fn new(vector: Vector, sealed: SealedPayload, split_dimension: usize, sequence: u64) -> Self {
        Self {
            vector,
            sealed,
            split_dimension,
            sequence,
            left: None,
            right: None,
        }
    }

    #[inline]
    pub fn vector(&self) -> &Vector {
        &self.vector
    }

    /// The encrypted coordinates of this node.
    #[inline]
    pub fn sealed(&self) -> &SealedPayload {
        &self.sealed
    }

    /// The coordinate index this node splits on.
    #[inline]
    pub fn split_dimension(&self) -> usize {
        self.split_dimension
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn left(&self) -> Option<NodeId> {
        self.left
    }

    #[inline]
    pub fn right(&self) -> Option<NodeId> {
        self.right
    }
}

/// Pending subtree during a bulk build.
struct BuildTask {
    entries: Vec<(u64, Vector)>,
    depth: usize,
    parent: Option<(NodeId, Side)>,
}

/// A k-d tree over fixed-dimension vectors with encrypted node payloads.
///
/// The tree itself is not synchronized; [`EncryptedIndex`](crate::EncryptedIndex)
/// wraps it in a read-write lock.
///
/// # Example
///
/// ```
/// use sealdb_core::{Key, KdTree, Vector};
///
/// let key = Key::generate();
/// let vectors = vec![
///     Vector::new("a", &[0.0, 0.0]),
///     Vector::new("b", &[5.0, 5.0]),
///     Vector::new("c", &[9.0, 1.0]),
/// ];
/// let tree = KdTree::build(vectors, 2, &key).unwrap();
///
/// let (id, dist_sq) = tree.nearest(&[8.0, 1.0], &key).unwrap().unwrap();
/// assert_eq!(tree.node(id).unwrap().vector().id(), "c");
/// assert!((dist_sq - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct KdTree {
    dimension: usize,
    nodes: Vec<KdNode>,
    root: Option<NodeId>,
}

impl KdTree {
    /// Creates an empty tree for vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self::with_capacity(dimension, 0)
    }

    /// Creates an empty tree with arena room for `capacity` nodes.
    pub fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension,
            nodes: Vec::with_capacity(capacity),
            root: None,
        }
    }

    /// Builds a balanced tree from `vectors`, numbering them in input order.
    pub fn build(vectors: Vec<Vector>, dimension: usize, key: &Key) -> Result<Self> {
        let entries = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i as u64, v))
            .collect();
        Self::build_sequenced(entries, dimension, key)
    }

    /// Builds a balanced tree from `(sequence, vector)` pairs.
    ///
    /// Every vector is validated before any node is sealed; the first invalid
    /// vector aborts the build.
    pub fn build_sequenced(
        entries: Vec<(u64, Vector)>,
        dimension: usize,
        key: &Key,
    ) -> Result<Self> {
        for (_, vector) in &entries {
            check_vector(vector, dimension)?;
        }

        let mut tree = Self::with_capacity(dimension, entries.len());
        let mut stack = vec![BuildTask {
            entries,
            depth: 0,
            parent: None,
        }];

        while let Some(BuildTask {
            mut entries,
            depth,
            parent,
        }) = stack.pop()
        {
            if entries.is_empty() {
                continue;
            }

            let dim = depth % dimension;
            // `sort_by` is stable: equal coordinates keep their relative order.
            entries.sort_by(|a, b| a.1[dim].partial_cmp(&b.1[dim]).unwrap_or(Ordering::Equal));

            let median = entries.len() / 2;
            let right = entries.split_off(median + 1);
            let Some((sequence, vector)) = entries.pop() else {
                continue;
            };
            let left = entries;

            let sealed = seal_coordinates(vector.as_slice(), key)?;
            let id = tree.push(KdNode::new(vector, sealed, dim, sequence));
            tree.attach(parent, id);

            stack.push(BuildTask {
                entries: right,
                depth: depth + 1,
                parent: Some((id, Side::Right)),
            });
            stack.push(BuildTask {
                entries: left,
                depth: depth + 1,
                parent: Some((id, Side::Left)),
            });
        }

        Ok(tree)
    }

    /// Inserts a single vector without rebalancing.
    ///
    /// The new leaf's split dimension is `depth % dimension`, where `depth`
    /// is the level it lands on. Returns the new node's id.
    ///
    /// Identifier uniqueness is not checked here.
    pub fn insert(&mut self, vector: Vector, sequence: u64, key: &Key) -> Result<NodeId> {
        check_vector(&vector, self.dimension)?;
        let sealed = seal_coordinates(vector.as_slice(), key)?;

        let mut depth = 0;
        let mut slot = None;
        let mut current = self.root;
        while let Some(id) = current {
            let node = &self.nodes[id];
            let dim = node.split_dimension;
            if vector[dim] < node.vector[dim] {
                slot = Some((id, Side::Left));
                current = node.left;
            } else {
                slot = Some((id, Side::Right));
                current = node.right;
            }
            depth += 1;
        }

        let id = self.push(KdNode::new(vector, sealed, depth % self.dimension, sequence));
        self.attach(slot, id);
        Ok(id)
    }

    /// Finds the stored vector closest to `query` by Euclidean distance.
    ///
    /// Returns the node id and the **squared** distance, or `None` for an
    /// empty tree. Exact ties go to the node with the highest sequence
    /// number, i.e. the most recently inserted vector.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if `query` has the wrong length.
    /// - [`Error::InvalidInput`] if `query` has a non-finite coordinate.
    /// - [`Error::Crypto`] if any visited node fails to decrypt. The search
    ///   stops there: skipping the node could silently return a wrong answer.
    pub fn nearest(&self, query: &[f32], key: &Key) -> Result<Option<(NodeId, f64)>> {
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

        let Some(root) = self.root else {
            return Ok(None);
        };

        let mut best: Option<(NodeId, f64)> = None;
        // (node, lower bound on the squared distance to anything in its subtree)
        let mut stack: Vec<(NodeId, f64)> = vec![(root, 0.0)];

        while let Some((id, bound)) = stack.pop() {
            if let Some((_, best_dist)) = best {
                if bound > best_dist {
                    continue;
                }
            }

            let node = &self.nodes[id];
            let coords = open_coordinates(&node.sealed, key)?;
            if coords.len() != self.dimension {
                return Err(Error::Crypto(format!(
                    "node {} decrypted to {} coordinates, expected {}",
                    node.vector.id(),
                    coords.len(),
                    self.dimension
                )));
            }

            let dist = euclidean_distance_squared(query, &coords);
            let improves = match best {
                None => true,
                Some((best_id, best_dist)) => {
                    dist < best_dist
                        || (dist == best_dist && node.sequence > self.nodes[best_id].sequence)
                }
            };
            if improves {
                best = Some((id, dist));
            }

            let dim = node.split_dimension;
            let (near, far) = if query[dim] < coords[dim] {
                (node.left, node.right)
            } else {
                (node.right, node.left)
            };

            // Far side first so the near side is popped (and searched) first.
            if let Some(far) = far {
                stack.push((far, bound.max(axis_distance_squared(query[dim], coords[dim]))));
            }
            if let Some(near) = near {
                stack.push((near, bound));
            }
        }

        Ok(best)
    }

    /// Returns node ids in in-order (left, node, right) sequence.
    pub fn in_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut current = self.root;

        loop {
            while let Some(id) = current {
                stack.push(id);
                current = self.nodes[id].left;
            }
            match stack.pop() {
                Some(id) => {
                    order.push(id);
                    current = self.nodes[id].right;
                }
                None => break,
            }
        }

        order
    }

    /// Number of levels in the tree; 0 when empty.
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();

        while let Some((id, level)) = stack.pop() {
            max_depth = max_depth.max(level);
            let node = &self.nodes[id];
            stack.extend(node.left.map(|c| (c, level + 1)));
            stack.extend(node.right.map(|c| (c, level + 1)));
        }

        max_depth
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&KdNode> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over `(id, node)` in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &KdNode)> + '_ {
        self.nodes.iter().enumerate()
    }

    #[cfg(test)]
    pub(crate) fn replace_sealed(&mut self, id: NodeId, sealed: SealedPayload) {
        self.nodes[id].sealed = sealed;
    }

    #[cfg(test)]
    pub(crate) fn replace_vector(&mut self, id: NodeId, vector: Vector) {
        self.nodes[id].vector = vector;
    }

    fn push(&mut self, node: KdNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn attach(&mut self, parent: Option<(NodeId, Side)>, child: NodeId) {
        match parent {
            None => self.root = Some(child),
            Some((p, Side::Left)) => self.nodes[p].left = Some(child),
            Some((p, Side::Right)) => self.nodes[p].right = Some(child),
        }
    }
}

fn check_vector(vector: &Vector, dimension: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            got: 0,
        });
    }
    vector.validate(dimension)
}
