//! graphd: serialized async access to an embedded graph store.
//!
//! The graph store is not thread-safe. graphd moves it onto a single worker
//! thread and funnels every read and write through a priority queue: reads
//! before writes, writes before shutdown, submission order within a class.
//! Callers get a completion handle back immediately and await it.
//!
//! # Example
//!
//! ```no_run
//! use graphd::{Config, Dispatcher, Outcome, SqliteGraph};
//!
//! # async fn demo() -> eyre::Result<()> {
//! let config = Config::default();
//! let store = SqliteGraph::open(&config.database)?;
//! let graph = Dispatcher::start(store, &config)?;
//!
//! // Queue writes, then a read
//! graph.add_node("A");
//! graph.add_node("B");
//! graph.add_edge("A", "B").await;
//!
//! let neighbors = graph.neighbors("A").await;
//! assert_eq!(neighbors.outcome, Outcome::Success);
//! assert_eq!(neighbors.payload["neighbors"], serde_json::json!(["B"]));
//!
//! // Drain the queue and join the worker
//! graph.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod handlers;
mod storage;
mod store;
mod types;

pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod operation;
pub mod queue;
pub mod worker;

// Re-export public API
pub use completion::{Completer, CompletionHandle};
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use handlers::classify;
pub use operation::{Completion, DEFAULT_BATCH_SIZE, OpKind, Operation, Outcome, Priority};
pub use queue::{PriorityQueue, PushError, ScheduledItem};
pub use storage::SqliteGraph;
pub use store::{GraphError, GraphResult, GraphStore};
pub use types::{Counts, EdgeRecord, KeyError, MAX_KEY_LEN, NodeRecord, Page, validate_key};
pub use worker::Worker;
