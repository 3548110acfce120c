//! Priority queue feeding the worker.
//!
//! Items are ordered by `(priority, sequence)`: lower priority values first,
//! then submission order. The sequence is a monotonic counter assigned under
//! the queue lock, so equal-priority items come out in exactly the order they
//! went in.
//!
//! Accepting a shutdown item seals the queue. Later pushes are rejected, so
//! shutdown is always the last item the worker sees.

use crate::completion::Completer;
use crate::operation::{Operation, Priority};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A queued operation together with the completer it must fulfill.
#[derive(Debug)]
pub struct ScheduledItem {
    priority: Priority,
    sequence: u64,
    operation: Operation,
    completer: Completer,
}

impl ScheduledItem {
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Split into the parts the worker consumes.
    pub fn into_parts(self) -> (Operation, Completer) {
        (self.operation, self.completer)
    }
}

impl PartialEq for ScheduledItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for ScheduledItem {}

impl PartialOrd for ScheduledItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledItem {
    // BinaryHeap is a max-heap, so the smallest (priority, sequence) must
    // compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.sequence).cmp(&(self.priority, self.sequence))
    }
}

/// Why a push was refused. The rejected completer comes back to the caller;
/// dropping it resolves the handle as `Unavailable`.
#[derive(Debug)]
pub enum PushError {
    /// Shutdown was already accepted.
    Closed(Completer),
    /// The configured capacity is reached.
    Full(Completer),
}

impl PushError {
    pub fn into_completer(self) -> Completer {
        match self {
            PushError::Closed(c) | PushError::Full(c) => c,
        }
    }
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushError::Closed(_) => write!(f, "queue is closed"),
            PushError::Full(_) => write!(f, "queue is full"),
        }
    }
}

impl std::error::Error for PushError {}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<ScheduledItem>,
    next_sequence: u64,
    closed: bool,
}

/// Concurrent priority queue: many pushers, one popper.
#[derive(Debug)]
pub struct PriorityQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: Option<usize>,
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityQueue {
    /// An unbounded queue.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// A queue holding at most `capacity` items, if given. Shutdown items are
    /// admitted even when the queue is full.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an operation. Never blocks. Returns the assigned sequence.
    pub fn push(&self, operation: Operation, completer: Completer) -> Result<u64, PushError> {
        let mut state = self.lock();

        if state.closed {
            return Err(PushError::Closed(completer));
        }
        if !operation.is_shutdown()
            && let Some(capacity) = self.capacity
            && state.heap.len() >= capacity
        {
            return Err(PushError::Full(completer));
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        if operation.is_shutdown() {
            state.closed = true;
        }

        completer.assign_sequence(sequence);
        state.heap.push(ScheduledItem {
            priority: operation.priority(),
            sequence,
            operation,
            completer,
        });
        drop(state);

        self.available.notify_one();
        Ok(sequence)
    }

    /// Remove the next item, blocking until one is available.
    pub fn pop(&self) -> ScheduledItem {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.heap.pop() {
                return item;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove the next item if one is ready.
    pub fn try_pop(&self) -> Option<ScheduledItem> {
        self.lock().heap.pop()
    }

    /// True once a shutdown item has been accepted.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Take everything still in the queue, in priority order. Only an
    /// accepted shutdown seals the queue, so the worker always sees one.
    pub fn drain(&self) -> Vec<ScheduledItem> {
        let mut state = self.lock();
        let mut items = Vec::with_capacity(state.heap.len());
        while let Some(item) = state.heap.pop() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

}
