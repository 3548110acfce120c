//! CLI argument parsing for graphd.

use clap::{Parser, Subcommand};
use graphd::Operation;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "graphd",
    about = "Serialized access to an embedded SQLite graph",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/graphd/logs/graphd.log"
)]
pub struct Cli {
    /// Path to a YAML config file (default: ~/.config/graphd/config.yml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the graph database (overrides the config file)
    #[arg(short = 'd', long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show node count, edge count and average degree
    Count,

    /// Add a node
    AddNode {
        /// Node key
        node: String,
    },

    /// Remove a node and its edges
    RemoveNode {
        /// Node key
        node: String,
    },

    /// Show a node
    Node {
        /// Node key
        node: String,
    },

    /// List nodes page by page
    Nodes {
        /// Page size (default: batch_size from config)
        #[arg(short, long)]
        size: Option<usize>,

        /// Index after which to start
        #[arg(long, default_value = "0")]
        cursor: u64,
    },

    /// Add an edge, creating missing endpoints
    AddEdge {
        /// Source node key
        source: String,

        /// Target node key
        target: String,
    },

    /// Remove an edge
    RemoveEdge {
        /// Source node key
        source: String,

        /// Target node key
        target: String,
    },

    /// Show an edge
    Edge {
        /// Source node key
        source: String,

        /// Target node key
        target: String,
    },

    /// List edges page by page
    Edges {
        /// Page size (default: batch_size from config)
        #[arg(short, long)]
        size: Option<usize>,

        /// Index after which to start
        #[arg(long, default_value = "0")]
        cursor: u64,
    },

    /// Show the nodes a node points to
    Neighbors {
        /// Node key
        node: String,
    },

    /// Replace the nodes a node points to
    SetNeighbors {
        /// Node key
        node: String,

        /// New neighbors (comma-separated)
        #[arg(value_delimiter = ',')]
        nodes: Vec<String>,
    },

    /// Show the nodes pointing to a node
    Predecessors {
        /// Node key
        node: String,
    },

    /// Replace the nodes pointing to a node
    SetPredecessors {
        /// Node key
        node: String,

        /// New predecessors (comma-separated)
        #[arg(value_delimiter = ',')]
        nodes: Vec<String>,
    },

    /// Run JSON-lines operations from a file (or stdin) concurrently
    Apply {
        /// Script file; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

impl Command {
    /// The single operation this command submits; `None` for `apply`.
    pub fn operation(&self, batch_size: usize) -> Option<Operation> {
        let op = match self {
            Command::Count => Operation::Count,
            Command::AddNode { node } => Operation::AddNode { node: node.clone() },
            Command::RemoveNode { node } => Operation::RemoveNode { node: node.clone() },
            Command::Node { node } => Operation::GetNode { node: node.clone() },
            Command::Nodes { size, cursor } => Operation::BatchNodes {
                size: size.unwrap_or(batch_size),
                cursor: *cursor,
            },
            Command::AddEdge { source, target } => Operation::AddEdge {
                source: source.clone(),
                target: target.clone(),
            },
            Command::RemoveEdge { source, target } => Operation::RemoveEdge {
                source: source.clone(),
                target: target.clone(),
            },
            Command::Edge { source, target } => Operation::GetEdge {
                source: source.clone(),
                target: target.clone(),
            },
            Command::Edges { size, cursor } => Operation::BatchEdges {
                size: size.unwrap_or(batch_size),
                cursor: *cursor,
            },
            Command::Neighbors { node } => Operation::GetNeighbors { node: node.clone() },
            Command::SetNeighbors { node, nodes } => Operation::SetNeighbors {
                node: node.clone(),
                nodes: nodes.clone(),
            },
            Command::Predecessors { node } => Operation::GetPredecessors { node: node.clone() },
            Command::SetPredecessors { node, nodes } => Operation::SetPredecessors {
                node: node.clone(),
                nodes: nodes.clone(),
            },
            Command::Apply { .. } => return None,
        };
        Some(op)
    }
}
