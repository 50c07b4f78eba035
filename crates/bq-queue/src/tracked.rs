//! `BlockQueue<u64>` wrapper that records every operation.
//!
//! Each push, pop and clear is applied to the queue and recorded while the
//! tracker lock is held, so the recorded history is a valid linearization
//! and `QueuePropertyChecker` can replay it exactly, even with several
//! consumers. Blocking consumers wait on a semaphore counting accepted
//! pushes instead of on the queue itself.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bq_core::{QueueHistory, QueueProperties};
use bq_sync::Sem;

use crate::block_queue::BlockQueue;
use crate::config::QueueConfig;
use crate::error::{ConfigError, PushError, QueueError};

#[derive(Default)]
struct QueueTracker {
    produced: Vec<u64>,
    consumed: Vec<u64>,
    discarded: Vec<u64>,
    history: QueueHistory,
    step: u64,
    rejected: u64,
    timeouts: u64,
}

impl QueueTracker {
    fn next_step(&mut self) -> u64 {
        self.step += 1;
        self.step
    }
}

/// Tracked queue of `u64` tags. Callers pass a thread id with each
/// operation so counterexamples can show who did what.
pub struct TrackedQueue {
    queue: BlockQueue<u64>,
    items: Sem,
    tracker: Mutex<QueueTracker>,
}

impl TrackedQueue {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::wrap(BlockQueue::new(capacity))
    }

    /// Tracked queue over `BlockQueue::with_config`.
    pub fn with_config(config: &QueueConfig) -> Result<Self, ConfigError> {
        Ok(Self::wrap(BlockQueue::with_config(config)?))
    }

    fn wrap(queue: BlockQueue<u64>) -> Self {
        Self {
            queue,
            items: Sem::new(0),
            tracker: Mutex::new(QueueTracker::default()),
        }
    }

    /// The underlying queue, for read-only queries.
    pub fn queue(&self) -> &BlockQueue<u64> {
        &self.queue
    }

    fn tracker(&self) -> MutexGuard<'_, QueueTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, thread_id: u64, item: u64) -> Result<(), PushError<u64>> {
        let mut tracker = self.tracker();
        let result = self.queue.push(item);
        let step = tracker.next_step();
        match &result {
            Ok(()) => {
                tracker.produced.push(item);
                tracker.history.record_push(thread_id, item, step);
            }
            Err(e) if e.is_full() => {
                tracker.rejected += 1;
                tracker.history.record_push_rejected(thread_id, item, step);
            }
            Err(_) => {}
        }
        drop(tracker);

        if result.is_ok() {
            // The item is queued either way; the semaphore logs a failed post.
            let _ = self.items.post();
        }
        result
    }

    /// Pop without blocking. `Ok(None)` when empty.
    pub fn try_pop(&self, thread_id: u64) -> Result<Option<u64>, QueueError> {
        self.take(thread_id, true)
    }

    /// Pop, blocking until an item is available.
    pub fn pop(&self, thread_id: u64) -> Result<u64, QueueError> {
        loop {
            self.items.wait()?;
            // The permit may be stale after a clear or a non-blocking pop.
            if let Some(item) = self.take(thread_id, false)? {
                return Ok(item);
            }
        }
    }

    /// Pop, waiting at most `timeout`.
    pub fn pop_timeout(&self, thread_id: u64, timeout: Duration) -> Result<u64, QueueError> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining = deadline.map_or(Duration::MAX, |d| {
                d.saturating_duration_since(Instant::now())
            });
            let permitted = self.items.wait_timeout(remaining)?;
            if let Some(item) = self.take(thread_id, false)? {
                return Ok(item);
            }
            if !permitted {
                self.tracker().timeouts += 1;
                return Err(QueueError::Timeout);
            }
        }
    }

    fn take(&self, thread_id: u64, record_empty: bool) -> Result<Option<u64>, QueueError> {
        let mut tracker = self.tracker();
        let item = match self.queue.try_pop() {
            Ok(item) => Some(item),
            Err(QueueError::Empty) => None,
            Err(e) => return Err(e),
        };
        if item.is_some() || record_empty {
            let step = tracker.next_step();
            tracker.consumed.extend(item);
            tracker.history.record_pop(thread_id, item, step);
        }
        Ok(item)
    }

    pub fn clear(&self, thread_id: u64) -> Result<(), QueueError> {
        let mut tracker = self.tracker();
        let dropped = self.queue.snapshot()?;
        self.queue.clear()?;
        let step = tracker.next_step();
        tracker.discarded.extend(dropped);
        tracker.history.record_clear(thread_id, step);
        Ok(())
    }

    /// Pushes rejected because the queue was full.
    pub fn rejected_count(&self) -> u64 {
        self.tracker().rejected
    }

    /// Timed pops that gave up.
    pub fn timeout_count(&self) -> u64 {
        self.tracker().timeouts
    }
}

impl QueueProperties for TrackedQueue {
    fn produced_items(&self) -> Vec<u64> {
        self.tracker().produced.clone()
    }

    fn consumed_items(&self) -> Vec<u64> {
        self.tracker().consumed.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.queue.snapshot().unwrap_or_default()
    }

    fn discarded_items(&self) -> Vec<u64> {
        self.tracker().discarded.clone()
    }

    fn capacity(&self) -> u64 {
        self.queue.capacity() as u64
    }

    fn history(&self) -> QueueHistory {
        self.tracker().history.clone()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use bq_core::{PropertyChecker, QueuePropertyChecker};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequential_history() {
        let queue = TrackedQueue::new(2);
        queue.push(0, 1).unwrap();
        queue.push(0, 2).unwrap();
        assert!(queue.push(0, 3).unwrap_err().is_full());
        assert_eq!(queue.try_pop(1).unwrap(), Some(1));
        queue.clear(1).unwrap();
        assert_eq!(queue.try_pop(1).unwrap(), None);

        assert_eq!(queue.rejected_count(), 1);
        assert_eq!(queue.discarded_items(), vec![2]);
        assert_eq!(queue.history().len(), 6);

        let checker = QueuePropertyChecker::new(&queue);
        assert!(checker.all_hold(), "{}", checker.report());
    }

    #[test]
    fn test_pop_after_clear_waits_for_fresh_item() {
        let queue = Arc::new(TrackedQueue::new(4));
        queue.push(0, 1).unwrap();
        queue.clear(0).unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(1))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(0, 2).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(2));
    }

    #[test]
    fn test_pop_timeout_counts() {
        let queue = TrackedQueue::new(2);
        assert_eq!(
            queue.pop_timeout(1, Duration::from_millis(10)),
            Err(QueueError::Timeout)
        );
        assert_eq!(queue.timeout_count(), 1);

        queue.push(0, 5).unwrap();
        assert_eq!(queue.pop_timeout(1, Duration::from_millis(10)), Ok(5));
    }

    #[test]
    fn test_concurrent_producers_and_consumers_hold_invariants() {
        const PRODUCERS: u64 = 3;
        const ITEMS: u64 = 300;

        let queue = Arc::new(TrackedQueue::new(4));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for n in 0..ITEMS {
                        let mut item = (p << 32) | n;
                        loop {
                            match queue.push(p, item) {
                                Ok(()) => break,
                                Err(e) => {
                                    item = e.into_inner();
                                    thread::yield_now();
                                }
                            }
                        }
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..2)
            .map(|c| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut got = 0;
                    while queue.pop_timeout(100 + c, Duration::from_millis(200)).is_ok() {
                        got += 1;
                    }
                    got
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        let consumed: u64 = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        assert_eq!(consumed, PRODUCERS * ITEMS);

        let checker = QueuePropertyChecker::new(&*queue);
        assert!(checker.all_hold(), "{}", checker.report());
    }
}
