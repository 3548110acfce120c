//! Shared test infrastructure for graphd integration tests.
//!
//! Provides TestEnv for a running dispatcher over a temp-dir database, and
//! ProbedStore, a store wrapper that records every call it receives.

#![allow(dead_code)]

use graphd::{
    Completion, Config, Dispatcher, EdgeRecord, GraphError, GraphResult, GraphStore, NodeRecord, Outcome, Page,
    PriorityQueue, SqliteGraph, Worker,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tempfile::TempDir;

/// What a ProbedStore observed.
#[derive(Default)]
pub struct Probe {
    history: Mutex<Vec<String>>,
    threads: Mutex<HashSet<ThreadId>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Probe {
    /// Every store call in the order it happened, as "method:key".
    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }

    /// Position of the first call matching `entry`.
    pub fn position(&self, entry: &str) -> usize {
        let history = self.history();
        history
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{} not in history {:?}", entry, history))
    }

    /// Highest number of store calls ever in flight at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Number of distinct threads that called into the store.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }
}

struct ActiveGuard(Arc<Probe>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store wrapper that records calls and can inject faults.
pub struct ProbedStore {
    inner: SqliteGraph,
    probe: Arc<Probe>,
    /// Node key whose calls panic
    pub panic_on: Option<String>,
    /// Node key whose calls fail with an internal error
    pub fail_on: Option<String>,
    /// Artificial latency per call
    pub delay: Option<Duration>,
}

impl ProbedStore {
    pub fn new(inner: SqliteGraph) -> (Self, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let store = Self {
            inner,
            probe: Arc::clone(&probe),
            panic_on: None,
            fail_on: None,
            delay: None,
        };
        (store, probe)
    }

    fn enter(&self, method: &str, key: &str) -> GraphResult<ActiveGuard> {
        let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(now, Ordering::SeqCst);
        self.probe.history.lock().unwrap().push(format!("{}:{}", method, key));
        self.probe.threads.lock().unwrap().insert(thread::current().id());
        let guard = ActiveGuard(Arc::clone(&self.probe));

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.panic_on.as_deref() == Some(key) {
            panic!("injected panic on {}", key);
        }
        if self.fail_on.as_deref() == Some(key) {
            return Err(GraphError::Internal(format!("injected failure on {}", key).into()));
        }
        Ok(guard)
    }
}

impl GraphStore for ProbedStore {
    fn node(&self, key: &str) -> GraphResult<NodeRecord> {
        let _g = self.enter("node", key)?;
        self.inner.node(key)
    }

    fn add_node(&mut self, key: &str) -> GraphResult<bool> {
        let _g = self.enter("add_node", key)?;
        self.inner.add_node(key)
    }

    fn remove_node(&mut self, key: &str) -> GraphResult<()> {
        let _g = self.enter("remove_node", key)?;
        self.inner.remove_node(key)
    }

    fn edge(&self, source: &str, target: &str) -> GraphResult<EdgeRecord> {
        let _g = self.enter("edge", source)?;
        self.inner.edge(source, target)
    }

    fn add_edge(&mut self, source: &str, target: &str) -> GraphResult<bool> {
        let _g = self.enter("add_edge", source)?;
        self.inner.add_edge(source, target)
    }

    fn remove_edge(&mut self, source: &str, target: &str) -> GraphResult<()> {
        let _g = self.enter("remove_edge", source)?;
        self.inner.remove_edge(source, target)
    }

    fn batch_nodes(&self, size: usize, cursor: u64) -> GraphResult<Page<NodeRecord>> {
        let _g = self.enter("batch_nodes", &cursor.to_string())?;
        self.inner.batch_nodes(size, cursor)
    }

    fn batch_edges(&self, size: usize, cursor: u64) -> GraphResult<Page<EdgeRecord>> {
        let _g = self.enter("batch_edges", &cursor.to_string())?;
        self.inner.batch_edges(size, cursor)
    }

    fn neighbors(&self, key: &str) -> GraphResult<Vec<String>> {
        let _g = self.enter("neighbors", key)?;
        self.inner.neighbors(key)
    }

    fn set_neighbors(&mut self, key: &str, nodes: &[String]) -> GraphResult<()> {
        let _g = self.enter("set_neighbors", key)?;
        self.inner.set_neighbors(key, nodes)
    }

    fn predecessors(&self, key: &str) -> GraphResult<Vec<String>> {
        let _g = self.enter("predecessors", key)?;
        self.inner.predecessors(key)
    }

    fn set_predecessors(&mut self, key: &str, nodes: &[String]) -> GraphResult<()> {
        let _g = self.enter("set_predecessors", key)?;
        self.inner.set_predecessors(key, nodes)
    }

    fn node_count(&self) -> GraphResult<u64> {
        let _g = self.enter("node_count", "")?;
        self.inner.node_count()
    }

    fn edge_count(&self) -> GraphResult<u64> {
        let _g = self.enter("edge_count", "")?;
        self.inner.edge_count()
    }
}

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub graph: Dispatcher,
    pub probe: Arc<Probe>,
}

impl TestEnv {
    /// A running dispatcher over a fresh database.
    pub fn new() -> Self {
        Self::with_store(|_| {})
    }

    /// Like `new`, letting the caller configure the probed store first.
    pub fn with_store(configure: impl FnOnce(&mut ProbedStore)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = Config {
            database: temp_dir.path().join("graph.db"),
            ..Config::default()
        };
        let inner = SqliteGraph::open(&config.database).expect("Failed to open graph");
        let (mut store, probe) = ProbedStore::new(inner);
        configure(&mut store);

        let graph = Dispatcher::start(store, &config).expect("Failed to start dispatcher");
        Self { temp_dir, graph, probe }
    }

    /// Add a node and assert it succeeded.
    pub async fn add_node(&self, key: &str) -> Completion {
        let completion = self.graph.add_node(key).await;
        assert_eq!(completion.outcome, Outcome::Success, "add_node {}: {:?}", key, completion);
        completion
    }

    /// Add an edge and assert it succeeded.
    pub async fn add_edge(&self, source: &str, target: &str) -> Completion {
        let completion = self.graph.add_edge(source, target).await;
        assert_eq!(
            completion.outcome,
            Outcome::Success,
            "add_edge {} -> {}: {:?}",
            source,
            target,
            completion
        );
        completion
    }

    /// Stop the worker and join it.
    pub async fn shutdown(&self) {
        self.graph.shutdown().await.expect("Failed to shut down");
    }
}

/// A queue and a not-yet-running worker over a probed in-memory store, for
/// tests that need to fill the queue before anything is dispatched.
pub fn paused_worker() -> (Dispatcher, Worker<ProbedStore>, Arc<Probe>) {
    let queue = Arc::new(PriorityQueue::new());
    let (store, probe) = ProbedStore::new(SqliteGraph::in_memory().expect("Failed to open graph"));
    let worker = Worker::new(store, Arc::clone(&queue));
    (Dispatcher::new(queue), worker, probe)
}
