//! The worker: sole owner of the graph store.
//!
//! The worker provides:
//! - Serialized access (one operation at a time, on one thread)
//! - Priority dispatch (reads, then writes, then shutdown)
//! - Error isolation (a failing operation never stops the loop)

use crate::handlers;
use crate::operation::OpKind;
use crate::queue::{PriorityQueue, ScheduledItem};
use crate::store::GraphStore;
use eyre::{Context, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "graph-worker";

/// Pulls operations off the queue and runs them against the store.
pub struct Worker<S: GraphStore> {
    store: S,
    queue: Arc<PriorityQueue>,
    running: bool,
    processed: u64,
}

impl<S: GraphStore + 'static> Worker<S> {
    /// Create a worker that takes ownership of `store`.
    pub fn new(store: S, queue: Arc<PriorityQueue>) -> Self {
        Self {
            store,
            queue,
            running: true,
            processed: 0,
        }
    }

    /// Run the worker on its own thread.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                self.run();
            })
            .context("Failed to spawn worker thread")
    }

    /// Run the loop on the current thread until a shutdown is dispatched.
    /// Returns the store.
    pub fn run(mut self) -> S {
        log::info!("Worker started");

        while self.running {
            let item = self.queue.pop();
            self.dispatch(item);
        }

        // Shutdown sealed the queue. Anything still here resolves as
        // unavailable when its completer drops.
        let leftovers = self.queue.drain();
        if !leftovers.is_empty() {
            log::warn!("Dropping {} operations left after shutdown", leftovers.len());
        }
        drop(leftovers);

        log::info!("Worker stopped after {} operations", self.processed);
        self.store
    }

    /// Run exactly one item and fulfill its handle.
    fn dispatch(&mut self, item: ScheduledItem) {
        let sequence = item.sequence();
        let priority = item.priority();
        let (operation, completer) = item.into_parts();
        let kind = operation.kind();

        log::trace!("Dispatching {} #{} ({:?})", kind.name(), sequence, priority);

        let handler = handlers::translate(handlers::handler_for::<S>(kind));
        let completion = handler(&mut self.store, &operation);

        if completer.is_abandoned() {
            log::debug!("Result of {} #{} has no reader", kind.name(), sequence);
        }
        completer.fulfill(completion);
        self.processed += 1;

        if kind == OpKind::Shutdown {
            log::info!("Shutdown dispatched, {} operations processed", self.processed);
            self.running = false;
        }
    }

    /// Number of operations dispatched so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{self, CompletionHandle};
    use crate::operation::{Operation, Outcome};
    use crate::storage::SqliteGraph;
    use crate::store::GraphStore;
    use serde_json::json;

    fn submit(queue: &PriorityQueue, operation: Operation) -> CompletionHandle {
        let (completer, handle) = completion::channel();
        queue.push(operation, completer).unwrap();
        handle
    }

    fn setup() -> (Arc<PriorityQueue>, Worker<SqliteGraph>) {
        let queue = Arc::new(PriorityQueue::new());
        let worker = Worker::new(SqliteGraph::in_memory().unwrap(), Arc::clone(&queue));
        (queue, worker)
    }

    #[test]
    fn test_run_drains_then_stops() {
        let (queue, worker) = setup();

        let a = submit(&queue, Operation::AddNode { node: "A".to_string() });
        let b = submit(&queue, Operation::AddNode { node: "B".to_string() });
        let stop = submit(&queue, Operation::Shutdown);

        let store = worker.run();

        assert_eq!(a.try_get().unwrap().outcome, Outcome::Success);
        assert_eq!(b.try_get().unwrap().outcome, Outcome::Success);
        assert_eq!(stop.try_get().unwrap().get("closed"), Some(&json!(true)));
        assert_eq!(store.node_count().unwrap(), 2);
    }

    #[test]
    fn test_failure_does_not_stop_loop() {
        let (queue, worker) = setup();

        let missing = submit(&queue, Operation::RemoveNode { node: "Q".to_string() });
        let next = submit(&queue, Operation::AddNode { node: "A".to_string() });
        submit(&queue, Operation::Shutdown);

        worker.run();

        let missing = missing.try_get().unwrap();
        assert_eq!(missing.outcome, Outcome::NotFound);
        assert_eq!(missing.get("removed"), Some(&json!(false)));
        assert_eq!(next.try_get().unwrap().outcome, Outcome::Success);
    }

    #[test]
    fn test_spawned_worker_stops_on_shutdown() {
        let (queue, worker) = setup();
        let thread = worker.spawn().unwrap();

        let stop = submit(&queue, Operation::Shutdown);
        thread.join().unwrap();

        assert!(!stop.is_pending());
        assert!(queue.is_closed());
    }

    #[test]
    fn test_processed_count() {
        let (queue, mut worker) = setup();
        submit(&queue, Operation::Count);
        let item = queue.try_pop().unwrap();
        worker.dispatch(item);
        assert_eq!(worker.processed(), 1);
    }
}
