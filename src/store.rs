//! Store interface the worker drives.
//!
//! Implementations are not required to be thread-safe: the worker is the only
//! caller, and it owns the store outright.

use crate::types::{Counts, EdgeRecord, KeyError, NodeRecord, Page};

/// Errors a graph store can report.
#[derive(Debug)]
pub enum GraphError {
    /// Node not found.
    NodeNotFound(String),
    /// Edge not found.
    EdgeNotFound { source: String, target: String },
    /// Key rejected by validation.
    InvalidKey { key: String, reason: KeyError },
    /// Anything else the backing storage reports.
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl GraphError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        let message: String = message.into();
        GraphError::Internal(message.into())
    }
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::NodeNotFound(key) => write!(f, "node not found: {}", key),
            GraphError::EdgeNotFound { source, target } => {
                write!(f, "edge not found: {} -> {}", source, target)
            }
            GraphError::InvalidKey { key, reason } => write!(f, "invalid key {:?}: {}", key, reason),
            GraphError::Internal(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::InvalidKey { reason, .. } => Some(reason),
            GraphError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for GraphError {
    fn from(e: rusqlite::Error) -> Self {
        GraphError::Internal(Box::new(e))
    }
}

/// Convenience alias for store results.
pub type GraphResult<T> = Result<T, GraphError>;

/// A mutable directed graph keyed by node identifiers.
///
/// `Send` is required so the store can be moved onto the worker thread; `Sync`
/// is not, and implementations are expected to rely on exclusive access.
pub trait GraphStore: Send {
    /// Read a node.
    fn node(&self, key: &str) -> GraphResult<NodeRecord>;

    /// Insert a node if absent. Returns true when it was created.
    fn add_node(&mut self, key: &str) -> GraphResult<bool>;

    /// Delete a node together with its incident edges.
    fn remove_node(&mut self, key: &str) -> GraphResult<()>;

    /// Read an edge.
    fn edge(&self, source: &str, target: &str) -> GraphResult<EdgeRecord>;

    /// Insert an edge if absent, creating missing endpoints. Returns true when
    /// the edge was created.
    fn add_edge(&mut self, source: &str, target: &str) -> GraphResult<bool>;

    /// Delete an edge.
    fn remove_edge(&mut self, source: &str, target: &str) -> GraphResult<()>;

    /// Up to `size` nodes whose index is greater than `cursor`.
    fn batch_nodes(&self, size: usize, cursor: u64) -> GraphResult<Page<NodeRecord>>;

    /// Up to `size` edges whose index is greater than `cursor`.
    fn batch_edges(&self, size: usize, cursor: u64) -> GraphResult<Page<EdgeRecord>>;

    /// Keys of the nodes `key` has edges to.
    fn neighbors(&self, key: &str) -> GraphResult<Vec<String>>;

    /// Replace the outgoing edges of `key`.
    fn set_neighbors(&mut self, key: &str, nodes: &[String]) -> GraphResult<()>;

    /// Keys of the nodes with edges into `key`.
    fn predecessors(&self, key: &str) -> GraphResult<Vec<String>>;

    /// Replace the incoming edges of `key`.
    fn set_predecessors(&mut self, key: &str, nodes: &[String]) -> GraphResult<()>;

    fn node_count(&self) -> GraphResult<u64>;

    fn edge_count(&self) -> GraphResult<u64>;

    /// Node and edge counts with the derived average degree.
    fn counts(&self) -> GraphResult<Counts> {
        Ok(Counts::new(self.node_count()?, self.edge_count()?))
    }
}
