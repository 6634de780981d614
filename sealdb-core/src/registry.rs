//! Non-duplicate topic registry.
//!
//! [`TopicIndex`] maps string topics to values and refuses to overwrite an
//! existing entry. Both search components use it as their identifier table:
//! the encrypted index maps identifiers to tree nodes, the flat collection
//! maps identifiers to positions.

use std::collections::hash_map::{Entry, HashMap};

use crate::error::{Error, Result};

/// A string-keyed registry with existence-checked insertion.
///
/// # Example
///
/// ```
/// use sealdb_core::{Error, TopicIndex};
///
/// let mut topics = TopicIndex::new();
/// topics.add("news", 1).unwrap();
/// assert!(matches!(topics.add("news", 2), Err(Error::AlreadyExists(_))));
/// assert_eq!(topics.get("news"), Some(&1));
/// ```
#[derive(Debug, Clone)]
pub struct TopicIndex<V> {
    entries: HashMap<String, V>,
}

impl<V> Default for TopicIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TopicIndex<V> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Creates an empty registry with room for `capacity` topics.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Registers `value` under `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the topic is already registered;
    /// the existing entry is left untouched.
    pub fn add(&mut self, topic: impl Into<String>, value: V) -> Result<()> {
        match self.entries.entry(topic.into()) {
            Entry::Occupied(e) => Err(Error::AlreadyExists(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(value);
                Ok(())
            }
        }
    }

    /// Removes a topic, returning its value if it was registered.
    pub fn remove(&mut self, topic: &str) -> Option<V> {
        self.entries.remove(topic)
    }

    #[inline]
    pub fn get(&self, topic: &str) -> Option<&V> {
        self.entries.get(topic)
    }

    #[inline]
    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(topic, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
