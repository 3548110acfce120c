//! Operations the worker executes and the results it hands back.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Page size used when a batch read does not specify one.
pub const DEFAULT_BATCH_SIZE: usize = 100;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// A unit of work for the worker: the operation tag together with its
/// arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Node and edge counts.
    Count,

    /// Insert a node.
    AddNode { node: String },

    /// Delete a node and its incident edges.
    RemoveNode { node: String },

    /// Insert an edge.
    AddEdge { source: String, target: String },

    /// Delete an edge.
    RemoveEdge { source: String, target: String },

    /// Read a node.
    GetNode { node: String },

    /// Read an edge.
    GetEdge { source: String, target: String },

    /// Read a page of nodes.
    BatchNodes {
        #[serde(default = "default_batch_size")]
        size: usize,
        #[serde(default)]
        cursor: u64,
    },

    /// Read a page of edges.
    BatchEdges {
        #[serde(default = "default_batch_size")]
        size: usize,
        #[serde(default)]
        cursor: u64,
    },

    /// Outgoing adjacency of a node.
    GetNeighbors { node: String },

    /// Replace the outgoing adjacency of a node.
    SetNeighbors { node: String, nodes: Vec<String> },

    /// Incoming adjacency of a node.
    GetPredecessors { node: String },

    /// Replace the incoming adjacency of a node.
    SetPredecessors { node: String, nodes: Vec<String> },

    /// Stop the worker once everything queued ahead of it has run.
    Shutdown,
}

/// Dispatch table key: the operation without its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Count,
    AddNode,
    RemoveNode,
    AddEdge,
    RemoveEdge,
    GetNode,
    GetEdge,
    BatchNodes,
    BatchEdges,
    GetNeighbors,
    SetNeighbors,
    GetPredecessors,
    SetPredecessors,
    Shutdown,
}

impl OpKind {
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Count => "count",
            OpKind::AddNode => "add_node",
            OpKind::RemoveNode => "remove_node",
            OpKind::AddEdge => "add_edge",
            OpKind::RemoveEdge => "remove_edge",
            OpKind::GetNode => "get_node",
            OpKind::GetEdge => "get_edge",
            OpKind::BatchNodes => "batch_nodes",
            OpKind::BatchEdges => "batch_edges",
            OpKind::GetNeighbors => "get_neighbors",
            OpKind::SetNeighbors => "set_neighbors",
            OpKind::GetPredecessors => "get_predecessors",
            OpKind::SetPredecessors => "set_predecessors",
            OpKind::Shutdown => "shutdown",
        }
    }
}

/// Scheduling class. Lower values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Read = 0,
    Write = 1,
    Lifecycle = 2,
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Count => OpKind::Count,
            Operation::AddNode { .. } => OpKind::AddNode,
            Operation::RemoveNode { .. } => OpKind::RemoveNode,
            Operation::AddEdge { .. } => OpKind::AddEdge,
            Operation::RemoveEdge { .. } => OpKind::RemoveEdge,
            Operation::GetNode { .. } => OpKind::GetNode,
            Operation::GetEdge { .. } => OpKind::GetEdge,
            Operation::BatchNodes { .. } => OpKind::BatchNodes,
            Operation::BatchEdges { .. } => OpKind::BatchEdges,
            Operation::GetNeighbors { .. } => OpKind::GetNeighbors,
            Operation::SetNeighbors { .. } => OpKind::SetNeighbors,
            Operation::GetPredecessors { .. } => OpKind::GetPredecessors,
            Operation::SetPredecessors { .. } => OpKind::SetPredecessors,
            Operation::Shutdown => OpKind::Shutdown,
        }
    }

    /// Fixed scheduling class of the operation.
    pub fn priority(&self) -> Priority {
        match self.kind() {
            OpKind::Count
            | OpKind::GetNode
            | OpKind::GetEdge
            | OpKind::BatchNodes
            | OpKind::BatchEdges
            | OpKind::GetNeighbors
            | OpKind::GetPredecessors => Priority::Read,
            OpKind::AddNode
            | OpKind::RemoveNode
            | OpKind::AddEdge
            | OpKind::RemoveEdge
            | OpKind::SetNeighbors
            | OpKind::SetPredecessors => Priority::Write,
            OpKind::Shutdown => Priority::Lifecycle,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Operation::Shutdown)
    }

    /// Request fields echoed back in every result payload.
    pub(crate) fn identity(&self) -> Value {
        match self {
            Operation::AddNode { node }
            | Operation::RemoveNode { node }
            | Operation::GetNode { node }
            | Operation::GetNeighbors { node }
            | Operation::SetNeighbors { node, .. }
            | Operation::GetPredecessors { node }
            | Operation::SetPredecessors { node, .. } => json!({ "node": node }),
            Operation::AddEdge { source, target }
            | Operation::RemoveEdge { source, target }
            | Operation::GetEdge { source, target } => {
                json!({ "edge": { "source": source, "target": target } })
            }
            Operation::BatchNodes { .. }
            | Operation::BatchEdges { .. }
            | Operation::Count
            | Operation::Shutdown => json!({}),
        }
    }
}

/// Classified result of a dispatched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    NotFound,
    InvalidInput,
    InternalError,
    /// The operation was never dispatched: the queue was closed or full.
    Unavailable,
}

impl Outcome {
    /// HTTP-style status code for front ends.
    pub fn status_code(self) -> u16 {
        match self {
            Outcome::Success => 200,
            Outcome::InvalidInput => 400,
            Outcome::NotFound => 404,
            Outcome::InternalError => 500,
            Outcome::Unavailable => 503,
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }

    /// Not-found and invalid input are the caller's fault.
    pub fn is_client_error(self) -> bool {
        matches!(self, Outcome::NotFound | Outcome::InvalidInput)
    }
}

/// What a fulfilled handle carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub payload: Value,
    pub outcome: Outcome,
}

impl Completion {
    pub fn success(payload: Value) -> Self {
        Self {
            payload,
            outcome: Outcome::Success,
        }
    }

    pub fn failure(outcome: Outcome, payload: Value) -> Self {
        Self { payload, outcome }
    }

    /// Completion for an operation that was never run.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            payload: json!({ "error": message.into() }),
            outcome: Outcome::Unavailable,
        }
    }

    /// Look up a top-level payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}
