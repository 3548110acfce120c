//! Core data types for the graph store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest node key accepted by the store, in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// A node as stored in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    /// Caller-supplied identifier
    pub key: String,

    /// Stable insertion index, also used as the paging cursor
    pub index: u64,

    /// When the node was first inserted
    pub created_at: DateTime<Utc>,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    /// Key of the node the edge leaves
    pub source: String,

    /// Key of the node the edge enters
    pub target: String,

    /// Stable insertion index, also used as the paging cursor
    pub index: u64,

    /// When the edge was first inserted
    pub created_at: DateTime<Utc>,
}

/// One page of a cursor-based enumeration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Index of the last returned entity; `None` once enumeration is exhausted.
    pub cursor: Option<u64>,
}

impl<T> Page<T> {
    /// Build a page from at most `size` items, deriving the next cursor.
    pub(crate) fn from_items(items: Vec<T>, size: usize, index_of: impl Fn(&T) -> u64) -> Self {
        let cursor = if items.len() < size {
            None
        } else {
            items.last().map(index_of)
        };
        Self { items, cursor }
    }
}

/// Aggregate counts over the whole graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counts {
    pub nodes_count: u64,
    pub edges_count: u64,
    /// Whole-number average out-degree
    pub avg_degree: u64,
}

impl Counts {
    /// Average out-degree rounded half-to-even; zero for an empty graph.
    pub fn new(nodes_count: u64, edges_count: u64) -> Self {
        let avg_degree = if nodes_count == 0 {
            0
        } else {
            (edges_count as f64 / nodes_count as f64).round_ties_even() as u64
        };
        Self {
            nodes_count,
            edges_count,
            avg_degree,
        }
    }
}

/// Reasons a node key is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyError {
    Empty,
    TooLong(usize),
    ControlCharacters,
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyError::Empty => write!(f, "key cannot be empty"),
            KeyError::TooLong(len) => write!(f, "key is {} bytes, limit is {}", len, MAX_KEY_LEN),
            KeyError::ControlCharacters => write!(f, "key contains control characters"),
        }
    }
}

impl std::error::Error for KeyError {}

/// Validate a node key.
pub fn validate_key(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(KeyError::TooLong(key.len()));
    }
    if key.chars().any(|c| c.is_control()) {
        return Err(KeyError::ControlCharacters);
    }
    Ok(())
}
