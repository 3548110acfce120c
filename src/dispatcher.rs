//! Dispatcher: the public facade callers submit operations through.

use crate::completion::{self, CompletionHandle};
use crate::config::Config;
use crate::operation::{Completion, Operation};
use crate::queue::PriorityQueue;
use crate::store::GraphStore;
use crate::worker::Worker;
use eyre::{Result, eyre};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Cloneable handle for submitting operations to the worker.
///
/// Every method returns immediately with a [`CompletionHandle`]; await it for
/// the result. Submissions made after shutdown was accepted resolve as
/// `Unavailable` without running.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<PriorityQueue>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Dispatcher {
    /// Dispatcher over an existing queue. The caller is responsible for
    /// running a [`Worker`] on the same queue.
    pub fn new(queue: Arc<PriorityQueue>) -> Self {
        Self {
            queue,
            worker: Arc::new(Mutex::new(None)),
        }
    }

    /// Move `store` onto a new worker thread and return a dispatcher for it.
    pub fn start<S: GraphStore + 'static>(store: S, config: &Config) -> Result<Self> {
        let queue = Arc::new(PriorityQueue::with_capacity(config.queue_capacity));
        let thread = Worker::new(store, Arc::clone(&queue)).spawn()?;

        let dispatcher = Self::new(queue);
        *dispatcher.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread);
        Ok(dispatcher)
    }

    /// The queue shared with the worker.
    pub fn queue(&self) -> &Arc<PriorityQueue> {
        &self.queue
    }

    /// Enqueue any operation at its fixed priority.
    pub fn submit(&self, operation: Operation) -> CompletionHandle {
        let (completer, handle) = completion::channel();
        let kind = operation.kind();

        match self.queue.push(operation, completer) {
            Ok(sequence) => log::trace!("Queued {} #{}", kind.name(), sequence),
            Err(e) => {
                log::warn!("Rejected {}: {}", kind.name(), e);
                let message = e.to_string();
                e.into_completer().fulfill(Completion::unavailable(message));
            }
        }

        handle
    }

    /// Node and edge counts.
    pub fn count(&self) -> CompletionHandle {
        self.submit(Operation::Count)
    }

    /// Insert a node.
    pub fn add_node(&self, node: impl Into<String>) -> CompletionHandle {
        self.submit(Operation::AddNode { node: node.into() })
    }

    /// Delete a node and its incident edges.
    pub fn remove_node(&self, node: impl Into<String>) -> CompletionHandle {
        self.submit(Operation::RemoveNode { node: node.into() })
    }

    /// Insert an edge, creating missing endpoints.
    pub fn add_edge(&self, source: impl Into<String>, target: impl Into<String>) -> CompletionHandle {
        self.submit(Operation::AddEdge {
            source: source.into(),
            target: target.into(),
        })
    }

    /// Delete an edge.
    pub fn remove_edge(&self, source: impl Into<String>, target: impl Into<String>) -> CompletionHandle {
        self.submit(Operation::RemoveEdge {
            source: source.into(),
            target: target.into(),
        })
    }

    /// Read a node.
    pub fn node(&self, node: impl Into<String>) -> CompletionHandle {
        self.submit(Operation::GetNode { node: node.into() })
    }

    /// Read an edge.
    pub fn edge(&self, source: impl Into<String>, target: impl Into<String>) -> CompletionHandle {
        self.submit(Operation::GetEdge {
            source: source.into(),
            target: target.into(),
        })
    }

    /// Read up to `size` nodes after `cursor`.
    pub fn batch_nodes(&self, size: usize, cursor: u64) -> CompletionHandle {
        self.submit(Operation::BatchNodes { size, cursor })
    }

    /// Read up to `size` edges after `cursor`.
    pub fn batch_edges(&self, size: usize, cursor: u64) -> CompletionHandle {
        self.submit(Operation::BatchEdges { size, cursor })
    }

    /// Outgoing adjacency of a node.
    pub fn neighbors(&self, node: impl Into<String>) -> CompletionHandle {
        self.submit(Operation::GetNeighbors { node: node.into() })
    }

    /// Replace the outgoing adjacency of a node.
    pub fn set_neighbors<I>(&self, node: impl Into<String>, nodes: I) -> CompletionHandle
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.submit(Operation::SetNeighbors {
            node: node.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
        })
    }

    /// Incoming adjacency of a node.
    pub fn predecessors(&self, node: impl Into<String>) -> CompletionHandle {
        self.submit(Operation::GetPredecessors { node: node.into() })
    }

    /// Replace the incoming adjacency of a node.
    pub fn set_predecessors<I>(&self, node: impl Into<String>, nodes: I) -> CompletionHandle
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.submit(Operation::SetPredecessors {
            node: node.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
        })
    }

    /// Ask the worker to stop once everything already queued has run.
    pub fn close(&self) -> CompletionHandle {
        self.submit(Operation::Shutdown)
    }

    /// Close, wait for the worker to drain, and join its thread.
    pub async fn shutdown(&self) -> Result<Completion> {
        let completion = self.close().await;

        let thread = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(thread) = thread {
            tokio::task::spawn_blocking(move || thread.join())
                .await?
                .map_err(|_| eyre!("Worker thread panicked"))?;
            log::info!("Worker joined");
        }

        Ok(completion)
    }
}
