//! HNSW (Hierarchical Navigable Small World) backend.
//!
//! An in-process implementation of [`AnnBackend`]: an approximate index over
//! plaintext points addressed by `u64` labels, ranked by Euclidean distance.
//! It is an alternative to the encrypted k-d tree for callers that can keep
//! points in the clear; the two share nothing but the distance function.
//!
//! # Algorithm Overview
//!
//! - Layer 0 contains all points with dense connections
//! - Higher layers contain fewer points with sparser connections (like a skip list)
//! - Search starts at the top layer and greedily descends to layer 0
//!
//! # References
//!
//! - Malkov & Yashunin (2018): "Efficient and robust approximate nearest neighbor search using HNSW graphs"

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::distance::euclidean_distance;
use crate::error::{Error, Result};
use crate::index::{AnnBackend, AnnMatch, Label};

/// Configuration for the HNSW backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Maximum number of connections per node (except layer 0).
    /// Higher = better recall, more memory. Typical: 16-64.
    pub m: usize,
    /// Maximum connections at layer 0 (usually 2*M).
    pub m_max0: usize,
    /// Beam width during construction. Higher = better graph quality, slower build.
    pub ef_construction: usize,
    /// Default beam width during search (the search-quality level).
    pub ef_search: usize,
    /// Seed for level assignment, so graphs are reproducible.
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            m_max0: 32,
            ef_construction: 100,
            ef_search: 50,
            seed: 12345,
        }
    }
}

impl HnswConfig {
    /// Creates config with specified M parameter.
    pub fn with_m(m: usize) -> Self {
        Self {
            m,
            m_max0: m * 2,
            ..Default::default()
        }
    }

    /// Sets the default search beam width. Chainable.
    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    point: Vec<f32>,
    /// neighbors[layer] = labels connected at that layer.
    neighbors: Vec<Vec<Label>>,
}

impl HnswNode {
    fn new(point: Vec<f32>, level: usize) -> Self {
        Self {
            point,
            neighbors: vec![Vec::new(); level + 1],
        }
    }
}

/// A candidate during search, ordered by distance (min-heap).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    label: Label,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (lower distance = higher priority)
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// A candidate for max-heap (furthest first).
#[derive(Debug, Clone, Copy)]
struct Furthest(Candidate);

impl PartialEq for Furthest {
    fn eq(&self, other: &Self) -> bool {
        self.0.distance == other.0.distance
    }
}

impl Eq for Furthest {}

impl PartialOrd for Furthest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Furthest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .distance
            .partial_cmp(&other.0.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// HNSW graph over labelled points.
///
/// # Example
///
/// ```
/// use sealdb_core::{AnnBackend, HnswBackend, HnswConfig};
///
/// let mut ann = HnswBackend::new(3, HnswConfig::default());
/// ann.add_point(&[1.0, 0.0, 0.0], 1).unwrap();
/// ann.add_point(&[0.9, 0.1, 0.0], 2).unwrap();
/// ann.add_point(&[0.0, 1.0, 0.0], 3).unwrap();
///
/// let results = ann.search_knn(&[1.0, 0.0, 0.0], 2, None).unwrap();
/// assert_eq!(results[0].label, 1);
/// ```
#[derive(Debug)]
pub struct HnswBackend {
    dimension: usize,
    config: HnswConfig,
    /// Level generation multiplier (1/ln(M)).
    ml: f64,
    entry_point: Option<Label>,
    max_level: usize,
    nodes: HashMap<Label, HnswNode>,
    rng: StdRng,
}

impl HnswBackend {
    /// Creates an empty graph.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        let ml = 1.0 / (config.m.max(2) as f64).ln();
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            dimension,
            config,
            ml,
            entry_point: None,
            max_level: 0,
            nodes: HashMap::new(),
            rng,
        }
    }

    /// Creates an empty graph with room for `capacity` points.
    pub fn with_capacity(dimension: usize, config: HnswConfig, capacity: usize) -> Self {
        let mut backend = Self::new(dimension, config);
        backend.nodes.reserve(capacity);
        backend
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Returns the stored point for a label.
    pub fn get(&self, label: Label) -> Option<&[f32]> {
        self.nodes.get(&label).map(|n| n.point.as_slice())
    }

    fn random_level(&mut self) -> usize {
        let r: f64 = self.rng.gen_range(f64::MIN_POSITIVE..1.0);
        (-r.ln() * self.ml).floor() as usize
    }

    #[inline]
    fn distance(&self, query: &[f32], label: Label) -> f32 {
        self.nodes
            .get(&label)
            .map(|n| euclidean_distance(query, &n.point))
            .unwrap_or(f32::INFINITY)
    }

    fn insert(&mut self, point: &[f32], label: Label) -> Result<()> {
        if point.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: point.len(),
            });
        }
        if point.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "point {} has a non-finite coordinate",
                label
            )));
        }
        if self.nodes.contains_key(&label) {
            return Err(Error::DuplicateId(label.to_string()));
        }

        let new_level = self.random_level();

        let Some(entry_point) = self.entry_point else {
            self.nodes
                .insert(label, HnswNode::new(point.to_vec(), new_level));
            self.entry_point = Some(label);
            self.max_level = new_level;
            return Ok(());
        };

        // Phase 1: greedy descent to new_level + 1
        let mut current_ep = entry_point;
        for layer in (new_level + 1..=self.max_level).rev() {
            current_ep = self.greedy_search_single(point, current_ep, layer);
        }

        // Phase 2: connect at each layer from min(new_level, max_level) down to 0
        self.nodes
            .insert(label, HnswNode::new(point.to_vec(), new_level));
        let mut ep_set = vec![current_ep];
        for layer in (0..=new_level.min(self.max_level)).rev() {
            let candidates =
                self.search_layer(point, &ep_set, self.config.ef_construction, layer, Some(label));
            let m = if layer == 0 {
                self.config.m_max0
            } else {
                self.config.m
            };
            let neighbors = select_neighbors(&candidates, m);

            if let Some(node) = self.nodes.get_mut(&label) {
                node.neighbors[layer] = neighbors.clone();
            }

            for &neighbor in &neighbors {
                self.link(neighbor, label, layer, m);
            }

            ep_set = candidates.iter().map(|c| c.label).collect();
        }

        if new_level > self.max_level {
            self.entry_point = Some(label);
            self.max_level = new_level;
        }

        Ok(())
    }

    /// Adds `label` to `from`'s neighbor list at `layer`, pruning to `m`.
    fn link(&mut self, from: Label, label: Label, layer: usize, m: usize) {
        let (origin, linked) = {
            let Some(node) = self.nodes.get_mut(&from) else {
                return;
            };
            let Some(neighbors) = node.neighbors.get_mut(layer) else {
                return;
            };
            neighbors.push(label);
            if neighbors.len() <= m {
                return;
            }
            (node.point.clone(), neighbors.clone())
        };

        let scored: Vec<Candidate> = linked
            .into_iter()
            .map(|nid| Candidate {
                label: nid,
                distance: self.distance(&origin, nid),
            })
            .collect();
        let pruned = select_neighbors(&scored, m);
        if let Some(node) = self.nodes.get_mut(&from) {
            node.neighbors[layer] = pruned;
        }
    }

    fn greedy_search_single(&self, query: &[f32], entry: Label, layer: usize) -> Label {
        let mut current = entry;
        let mut current_dist = self.distance(query, current);

        loop {
            let mut changed = false;
            if let Some(node) = self.nodes.get(&current) {
                if let Some(neighbors) = node.neighbors.get(layer) {
                    for &neighbor in neighbors {
                        let dist = self.distance(query, neighbor);
                        if dist < current_dist {
                            current = neighbor;
                            current_dist = dist;
                            changed = true;
                        }
                    }
                }
            }

            if !changed {
                return current;
            }
        }
    }

    /// Beam search over one layer. `exclude` keeps a node being inserted out
    /// of its own candidate list.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[Label],
        ef: usize,
        layer: usize,
        exclude: Option<Label>,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<Label> = HashSet::new();
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut results: BinaryHeap<Furthest> = BinaryHeap::new();

        if let Some(label) = exclude {
            visited.insert(label);
        }

        for &ep in entry_points {
            if visited.insert(ep) {
                let c = Candidate {
                    label: ep,
                    distance: self.distance(query, ep),
                };
                candidates.push(c);
                results.push(Furthest(c));
            }
        }

        while let Some(closest) = candidates.pop() {
            if let Some(furthest) = results.peek() {
                if closest.distance > furthest.0.distance && results.len() >= ef {
                    break;
                }
            }

            let Some(neighbors) = self
                .nodes
                .get(&closest.label)
                .and_then(|n| n.neighbors.get(layer))
            else {
                continue;
            };

            for &neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let dist = self.distance(query, neighbor);
                let worst = results.peek().map(|f| f.0.distance).unwrap_or(f32::MAX);
                if results.len() < ef || dist < worst {
                    let c = Candidate {
                        label: neighbor,
                        distance: dist,
                    };
                    candidates.push(c);
                    results.push(Furthest(c));
                    while results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<Candidate> = results.into_iter().map(|f| f.0).collect();
        found.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
        });
        found
    }
}

/// Keeps the `m` closest candidates.
fn select_neighbors(candidates: &[Candidate], m: usize) -> Vec<Label> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
    });
    sorted.into_iter().take(m).map(|c| c.label).collect()
}

impl AnnBackend for HnswBackend {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn add_point(&mut self, point: &[f32], label: Label) -> Result<()> {
        self.insert(point, label)
    }

    fn search_knn(&self, query: &[f32], k: usize, quality: Option<usize>) -> Result<Vec<AnnMatch>> {
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
        let Some(entry_point) = self.entry_point else {
            return Ok(Vec::new());
        };

        let ef = quality.unwrap_or(self.config.ef_search).max(k);

        let mut current_ep = entry_point;
        for layer in (1..=self.max_level).rev() {
            current_ep = self.greedy_search_single(query, current_ep, layer);
        }

        Ok(self
            .search_layer(query, &[current_ep], ef, 0, None)
            .into_iter()
            .take(k)
            .map(|c| AnnMatch {
                label: c.label,
                distance: c.distance,
            })
            .collect())
    }

    fn set_search_quality(&mut self, level: usize) {
        self.config.ef_search = level.max(1);
    }
}
