//! Single-assignment completion handles.
//!
//! `channel()` returns two halves sharing one slot. The [`Completer`] travels
//! with the queued item to the worker; the [`CompletionHandle`] stays with the
//! caller. Fulfilling consumes the completer, so a slot can only be written
//! through it once. A completer dropped without being fulfilled (rejected or
//! drained item) resolves the handle as `Unavailable`, so no caller waits on a
//! handle that can never complete.

use crate::operation::Completion;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug)]
enum State {
    Pending,
    Fulfilled(Completion),
}

#[derive(Debug)]
struct Slot {
    state: Mutex<State>,
    notify: Notify,
    sequence: OnceLock<u64>,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the result and wake every waiter. Returns false if the slot was
    /// already fulfilled, in which case the new result is discarded.
    fn complete(&self, completion: Completion) -> bool {
        {
            let mut state = self.lock();
            if let State::Fulfilled(_) = *state {
                log::warn!("Completion already fulfilled; ignoring second result");
                return false;
            }
            *state = State::Fulfilled(completion);
        }
        self.notify.notify_waiters();
        true
    }
}

/// Create a linked completer/handle pair.
pub fn channel() -> (Completer, CompletionHandle) {
    let slot = Arc::new(Slot {
        state: Mutex::new(State::Pending),
        notify: Notify::new(),
        sequence: OnceLock::new(),
    });
    (
        Completer {
            slot: Some(Arc::clone(&slot)),
        },
        CompletionHandle { slot },
    )
}

/// Worker-side half of a completion.
#[derive(Debug)]
pub struct Completer {
    slot: Option<Arc<Slot>>,
}

impl Completer {
    /// Fulfill the paired handle.
    pub fn fulfill(mut self, completion: Completion) {
        if let Some(slot) = self.slot.take() {
            slot.complete(completion);
        }
    }

    /// True once the caller has dropped its handle; the result will go unread.
    pub fn is_abandoned(&self) -> bool {
        self.slot.as_ref().is_none_or(|slot| Arc::strong_count(slot) == 1)
    }

    pub(crate) fn assign_sequence(&self, sequence: u64) {
        if let Some(slot) = &self.slot {
            let _ = slot.sequence.set(sequence);
        }
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.complete(Completion::unavailable("operation was dropped before it ran"));
        }
    }
}

/// Caller-side half of a completion: a future-like handle that resolves once
/// the worker has run the operation.
///
/// Waiting never times out on its own; wrap [`wait`](Self::wait) in a deadline
/// or use [`wait_timeout`](Self::wait_timeout). Dropping the handle does not
/// cancel the operation.
#[derive(Debug)]
pub struct CompletionHandle {
    slot: Arc<Slot>,
}

impl CompletionHandle {
    /// True until the worker has fulfilled the handle.
    pub fn is_pending(&self) -> bool {
        matches!(*self.slot.lock(), State::Pending)
    }

    /// Queue sequence number, once the operation has been accepted.
    pub fn sequence(&self) -> Option<u64> {
        self.slot.sequence.get().copied()
    }

    /// The result, if already available.
    pub fn try_get(&self) -> Option<Completion> {
        match &*self.slot.lock() {
            State::Pending => None,
            State::Fulfilled(completion) => Some(completion.clone()),
        }
    }

    /// Wait for the result.
    pub async fn wait(&self) -> Completion {
        loop {
            let notified = self.slot.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a fulfillment in between still wakes us.
            notified.as_mut().enable();

            if let Some(completion) = self.try_get() {
                return completion;
            }
            notified.await;
        }
    }

    /// Wait for the result for at most `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<Completion> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

impl IntoFuture for CompletionHandle {
    type Output = Completion;
    type IntoFuture = Pin<Box<dyn Future<Output = Completion> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Outcome;
    use serde_json::json;

    #[test]
    fn test_pending_until_fulfilled() {
        let (completer, handle) = channel();
        assert!(handle.is_pending());
        assert!(handle.try_get().is_none());

        completer.fulfill(Completion::success(json!({ "ok": true })));

        assert!(!handle.is_pending());
        let completion = handle.try_get().unwrap();
        assert_eq!(completion.outcome, Outcome::Success);
        // Read-many after completion
        assert_eq!(handle.try_get().unwrap(), completion);
    }

    #[test]
    fn test_dropped_completer_resolves_unavailable() {
        let (completer, handle) = channel();
        drop(completer);

        let completion = handle.try_get().unwrap();
        assert_eq!(completion.outcome, Outcome::Unavailable);
        assert!(completion.get("error").is_some());
    }

    #[test]
    fn test_second_completion_ignored() {
        let (completer, handle) = channel();
        let slot = Arc::clone(&handle.slot);

        completer.fulfill(Completion::success(json!(1)));
        assert!(!slot.complete(Completion::success(json!(2))));
        assert_eq!(handle.try_get().unwrap().payload, json!(1));
    }

    #[test]
    fn test_abandoned() {
        let (completer, handle) = channel();
        assert!(!completer.is_abandoned());
        drop(handle);
        assert!(completer.is_abandoned());
    }

    #[test]
    fn test_sequence_assigned_once() {
        let (completer, handle) = channel();
        assert_eq!(handle.sequence(), None);
        completer.assign_sequence(7);
        completer.assign_sequence(9);
        assert_eq!(handle.sequence(), Some(7));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_fulfill_from_thread() {
        let (completer, handle) = channel();

        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            completer.fulfill(Completion::success(json!({ "node": "A" })));
        });

        let completion = handle.wait().await;
        assert_eq!(completion.get("node"), Some(&json!("A")));
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn test_wait_after_fulfill_returns_immediately() {
        let (completer, handle) = channel();
        completer.fulfill(Completion::success(json!(null)));
        assert_eq!(handle.await.outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn test_wait_timeout_elapses() {
        let (_completer, handle) = channel();
        assert!(handle.wait_timeout(Duration::from_millis(10)).await.is_none());
        assert!(handle.is_pending());
    }
}
