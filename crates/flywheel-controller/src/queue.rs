// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The controller work queue.
//!
//! Classic workqueue semantics: an item being processed is never
//! handed to a second getter, and an `add` landing while the item is
//! in flight marks it dirty so `done` re-queues it exactly once.
//! Layered on top: delayed re-adds and per-item exponential backoff
//! for rate-limited retries.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

/// Default per-item backoff floor.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default per-item backoff ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

struct QueueState<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    shutting_down: bool,
}

/// A coalescing FIFO of work items.
///
/// Invariant: every queued item is dirty; a dirty item is either
/// queued or processing, never both.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T: Clone + Eq + Hash> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash> WorkQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Add an item. Duplicates of a pending or in-flight item coalesce;
    /// adds after shutdown are dropped.
    pub fn add(&self, item: T) {
        {
            let mut state = self.state.lock().expect("work queue lock poisoned");
            if state.shutting_down {
                return;
            }
            if state.dirty.contains(&item) {
                return;
            }
            state.dirty.insert(item.clone());
            if state.processing.contains(&item) {
                return;
            }
            state.queue.push_back(item);
        }
        self.notify.notify_waiters();
    }

    /// Wait for the next item; `None` once the queue shuts down.
    ///
    /// The returned item is marked processing and will not be handed
    /// out again until [`WorkQueue::done`] is called for it.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            {
                let mut state = self.state.lock().expect("work queue lock poisoned");
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark an item finished. If it went dirty while processing it is
    /// re-queued.
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut state = self.state.lock().expect("work queue lock poisoned");
            state.processing.remove(item);
            if state.dirty.contains(item) && !state.shutting_down {
                state.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_waiters();
        }
    }

    /// Number of items waiting (not counting in-flight ones).
    pub fn len(&self) -> usize {
        self.state.lock().expect("work queue lock poisoned").queue.len()
    }

    /// True when no items are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the queue: pending items are discarded from getters'
    /// perspective and every blocked [`WorkQueue::get`] returns `None`.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock().expect("work queue lock poisoned");
            state.shutting_down = true;
        }
        self.notify.notify_waiters();
    }

    /// True once shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.state
            .lock()
            .expect("work queue lock poisoned")
            .shutting_down
    }
}

/// Per-item exponential backoff: each failure doubles the delay from
/// the base up to the cap; `forget` resets the item.
pub struct ExponentialBackoff<T> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T: Clone + Eq + Hash> ExponentialBackoff<T> {
    /// Create a backoff policy with the given floor and ceiling.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// The delay to apply for the next retry of `item`; records the
    /// failure.
    pub fn when(&self, item: &T) -> Duration {
        let mut failures = self.failures.lock().expect("backoff lock poisoned");
        let count = failures.entry(item.clone()).or_insert(0);
        let exponent = *count;
        *count += 1;

        let backoff = self.base.as_secs_f64() * 2f64.powi(exponent.min(62) as i32);
        if backoff > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(backoff)
        }
    }

    /// Number of recorded failures for `item`.
    pub fn retries(&self, item: &T) -> u32 {
        self.failures
            .lock()
            .expect("backoff lock poisoned")
            .get(item)
            .copied()
            .unwrap_or(0)
    }

    /// Clear the failure history of `item`.
    pub fn forget(&self, item: &T) {
        self.failures
            .lock()
            .expect("backoff lock poisoned")
            .remove(item);
    }
}

impl<T: Clone + Eq + Hash> Default for ExponentialBackoff<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

/// A named work queue with delayed and rate-limited re-adds.
pub struct RateLimitedQueue<T> {
    name: String,
    queue: WorkQueue<T>,
    limiter: ExponentialBackoff<T>,
}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> RateLimitedQueue<T> {
    /// Create a queue named `name` with the default backoff policy.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queue: WorkQueue::new(),
            limiter: ExponentialBackoff::default(),
        }
    }

    /// Create a queue with a custom backoff policy.
    pub fn with_backoff(name: &str, limiter: ExponentialBackoff<T>) -> Self {
        Self {
            name: name.to_string(),
            queue: WorkQueue::new(),
            limiter,
        }
    }

    /// The queue name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an item immediately.
    pub fn add(&self, item: T) {
        self.queue.add(item);
    }

    /// Add an item after `delay`.
    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if delay.is_zero() {
            self.queue.add(item);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Add an item with per-item exponential backoff.
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let delay = self.limiter.when(&item);
        self.add_after(item, delay);
    }

    /// Clear the backoff history for an item that reconciled cleanly.
    pub fn forget(&self, item: &T) {
        self.limiter.forget(item);
    }

    /// Number of recorded rate-limited retries for `item`.
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.limiter.retries(item)
    }

    /// See [`WorkQueue::get`].
    pub async fn get(&self) -> Option<T> {
        self.queue.get().await
    }

    /// See [`WorkQueue::done`].
    pub fn done(&self, item: &T) {
        self.queue.done(item);
    }

    /// See [`WorkQueue::len`].
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when no items are waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// See [`WorkQueue::shutdown`].
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    /// True once shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new();
        queue.add("a");
        queue.add("b");
        assert_eq!(queue.get().await, Some("a"));
        assert_eq!(queue.get().await, Some("b"));
    }

    #[tokio::test]
    async fn test_pending_duplicates_coalesce() {
        let queue = WorkQueue::new();
        queue.add("a");
        queue.add("a");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some("a"));
        queue.done(&"a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_add_while_processing_requeues_on_done() {
        let queue = WorkQueue::new();
        queue.add("a");
        let item = queue.get().await.unwrap();
        assert!(queue.is_empty());

        // Lands in dirty, not in the queue, while "a" is in flight.
        queue.add("a");
        queue.add("a");
        assert!(queue.is_empty());

        queue.done(&item);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some("a"));
        queue.done(&"a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_get_blocks_until_add() {
        let queue = Arc::new(WorkQueue::new());
        let getter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.add("late");
        assert_eq!(getter.await.unwrap(), Some("late"));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_getters() {
        let queue = Arc::new(WorkQueue::<&str>::new());
        let getter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shutdown();
        assert_eq!(getter.await.unwrap(), None);

        // Adds after shutdown are dropped.
        queue.add("x");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(30));
        assert_eq!(backoff.when(&"k"), Duration::from_millis(5));
        assert_eq!(backoff.when(&"k"), Duration::from_millis(10));
        assert_eq!(backoff.when(&"k"), Duration::from_millis(20));
        assert_eq!(backoff.when(&"k"), Duration::from_millis(30));
        assert_eq!(backoff.when(&"k"), Duration::from_millis(30));
        assert_eq!(backoff.retries(&"k"), 5);

        backoff.forget(&"k");
        assert_eq!(backoff.retries(&"k"), 0);
        assert_eq!(backoff.when(&"k"), Duration::from_millis(5));
    }

    #[test]
    fn test_backoff_is_per_item() {
        let backoff = ExponentialBackoff::default();
        backoff.when(&"a");
        backoff.when(&"a");
        assert_eq!(backoff.retries(&"a"), 2);
        assert_eq!(backoff.retries(&"b"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_delays_delivery() {
        let queue = Arc::new(RateLimitedQueue::new("test"));
        queue.add_after("a", Duration::from_secs(5));
        tokio::task::yield_now().await;
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(queue.get().await, Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_adds_back_off() {
        let queue = Arc::new(RateLimitedQueue::new("test"));
        queue.add_rate_limited("a");
        assert_eq!(queue.num_requeues(&"a"), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.get().await, Some("a"));
        queue.done(&"a");

        queue.forget(&"a");
        assert_eq!(queue.num_requeues(&"a"), 0);
    }
}
