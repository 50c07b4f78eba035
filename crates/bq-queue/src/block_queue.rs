//! Bounded blocking queue over a circular buffer.
//!
//! One lock guards the whole ring; one condition variable wakes consumers.
//! Every push broadcasts, accepted or not, and every waiter re-checks the
//! ring after it wakes.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use bq_queue::BlockQueue;
//!
//! let queue = Arc::new(BlockQueue::new(2));
//! let consumer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || queue.pop())
//! };
//! queue.push("line 1").unwrap();
//! assert_eq!(consumer.join().unwrap().unwrap(), "line 1");
//! ```
//!
//! For loom tests:
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test -p bq-queue --release
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use bq_dst::DstTestableQueue;
use bq_sync::{Cond, Locker, LockerGuard, WaitStatus};

use crate::config::{QueueConfig, TimedPopPolicy, CAPACITY_DEFAULT};
use crate::error::{ConfigError, PushError, QueueError};

/// Ring storage. `head` is the slot last popped and `tail` the slot last
/// written; `None` means nothing since construction or the last clear.
struct Ring<T> {
    slots: Box<[Option<T>]>,
    count: usize,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            count: 0,
            head: None,
            tail: None,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn advance(&self, cursor: Option<usize>) -> usize {
        cursor.map_or(0, |i| (i + 1) % self.capacity())
    }

    fn is_full(&self) -> bool {
        self.count >= self.capacity()
    }

    fn push_back(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let tail = self.advance(self.tail);
        self.slots[tail] = Some(item);
        self.tail = Some(tail);
        self.count += 1;
        Ok(())
    }

    fn pop_front(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let head = self.advance(self.head);
        let item = self.slots[head].take();
        debug_assert!(item.is_some(), "slot {} empty with count {}", head, self.count);
        self.head = Some(head);
        self.count -= 1;
        item
    }

    fn front(&self) -> Option<&T> {
        if self.count == 0 {
            return None;
        }
        self.slots[self.advance(self.head)].as_ref()
    }

    fn back(&self) -> Option<&T> {
        if self.count == 0 {
            return None;
        }
        self.tail.and_then(|tail| self.slots[tail].as_ref())
    }

    /// Stale items stay in their slots until overwritten or dropped.
    fn clear(&mut self) {
        self.count = 0;
        self.head = None;
        self.tail = None;
    }

    fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let start = self.advance(self.head);
        (0..self.count).filter_map(move |i| self.slots[(start + i) % self.capacity()].as_ref())
    }
}

/// Fixed-capacity FIFO queue shared between producer and consumer threads.
///
/// `push` never blocks: a full queue hands the item back. `pop` blocks
/// until an item arrives; `pop_timeout` bounds the wait.
pub struct BlockQueue<T> {
    state: Locker<Ring<T>>,
    not_empty: Cond,
    capacity: usize,
    timed_pop: TimedPopPolicy,
}

impl<T> BlockQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BlockQueue capacity must be positive");
        Self::build(capacity, TimedPopPolicy::default())
    }

    /// Create a queue from validated configuration.
    pub fn with_config(config: &QueueConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config.capacity, config.timed_pop))
    }

    /// Create a queue with an explicit timed-pop policy.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_policy(capacity: usize, timed_pop: TimedPopPolicy) -> Self {
        assert!(capacity > 0, "BlockQueue capacity must be positive");
        Self::build(capacity, timed_pop)
    }

    fn build(capacity: usize, timed_pop: TimedPopPolicy) -> Self {
        Self {
            state: Locker::new(Ring::with_capacity(capacity)),
            not_empty: Cond::new(),
            capacity,
            timed_pop,
        }
    }

    fn lock(&self) -> Result<LockerGuard<'_, Ring<T>>, QueueError> {
        Ok(self.state.lock()?)
    }

    /// Maximum number of queued items. Fixed at construction, so no lock is taken.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How `pop_timeout` treats a wake that finds the queue empty.
    pub fn timed_pop_policy(&self) -> TimedPopPolicy {
        self.timed_pop
    }

    /// Drop every queued item from the queue's point of view.
    pub fn clear(&self) -> Result<(), QueueError> {
        self.lock()?.clear();
        Ok(())
    }

    /// Whether a push would be rejected right now.
    pub fn is_full(&self) -> Result<bool, QueueError> {
        Ok(self.lock()?.is_full())
    }

    /// Whether a non-blocking pop would fail right now.
    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.lock()?.count == 0)
    }

    /// Number of queued items at the moment of the call.
    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.lock()?.count)
    }

    /// Append `item`, waking every blocked consumer.
    ///
    /// A full queue returns the item inside the error. Waiters are woken
    /// in that case too.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut ring = match self.state.lock() {
            Ok(ring) => ring,
            Err(e) => return Err(PushError::new(item, e.into())),
        };
        let result = ring.push_back(item);
        self.not_empty.notify_all();
        drop(ring);
        result.map_err(|item| PushError::new(item, QueueError::Full))
    }

    /// Remove the front item, blocking while the queue is empty.
    pub fn pop(&self) -> Result<T, QueueError> {
        let mut ring = self.lock()?;
        loop {
            if let Some(item) = ring.pop_front() {
                return Ok(item);
            }
            ring = self.not_empty.wait(ring)?;
        }
    }

    /// Remove the front item, waiting at most `timeout` for one to arrive.
    ///
    /// A failed wait counts as a timeout. How often the pop waits before
    /// giving up is set by the queue's `TimedPopPolicy`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.pop();
        };

        let mut ring = self.lock()?;
        loop {
            if let Some(item) = ring.pop_front() {
                return Ok(item);
            }
            let (guard, status) = self
                .not_empty
                .wait_until(ring, deadline)
                .map_err(|_| QueueError::Timeout)?;
            ring = guard;

            match (self.timed_pop, status) {
                (TimedPopPolicy::SingleAttempt, WaitStatus::TimedOut) => {
                    return Err(QueueError::Timeout)
                }
                (TimedPopPolicy::SingleAttempt, WaitStatus::Notified)
                | (TimedPopPolicy::Deadline, WaitStatus::TimedOut) => {
                    return ring.pop_front().ok_or(QueueError::Timeout)
                }
                (TimedPopPolicy::Deadline, WaitStatus::Notified) => {}
            }
        }
    }

    /// `pop_timeout` with the timeout in milliseconds.
    pub fn pop_timeout_ms(&self, timeout_ms: u64) -> Result<T, QueueError> {
        self.pop_timeout(Duration::from_millis(timeout_ms))
    }

    /// Remove the front item without waiting.
    pub fn try_pop(&self) -> Result<T, QueueError> {
        self.lock()?.pop_front().ok_or(QueueError::Empty)
    }
}

impl<T: Clone> BlockQueue<T> {
    /// Clone of the oldest item.
    pub fn front(&self) -> Result<T, QueueError> {
        self.lock()?.front().cloned().ok_or(QueueError::Empty)
    }

    /// Clone of the newest item.
    pub fn back(&self) -> Result<T, QueueError> {
        self.lock()?.back().cloned().ok_or(QueueError::Empty)
    }

    /// Clones of every queued item, front to back.
    pub fn snapshot(&self) -> Result<Vec<T>, QueueError> {
        Ok(self.lock()?.iter().cloned().collect())
    }
}

impl<T> Default for BlockQueue<T> {
    fn default() -> Self {
        Self::build(CAPACITY_DEFAULT, TimedPopPolicy::default())
    }
}

impl<T> fmt::Debug for BlockQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockQueue")
            .field("capacity", &self.capacity)
            .field("timed_pop", &self.timed_pop)
            .finish_non_exhaustive()
    }
}

impl DstTestableQueue for BlockQueue<u64> {
    fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity)
    }

    fn push(&self, item: u64) -> bool {
        BlockQueue::push(self, item).is_ok()
    }

    fn try_pop(&self) -> Option<u64> {
        BlockQueue::try_pop(self).ok()
    }

    fn pop(&self) -> Option<u64> {
        BlockQueue::pop(self).ok()
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<u64> {
        BlockQueue::pop_timeout(self, timeout).ok()
    }

    fn clear(&self) {
        // Poisoning needs a panic under the lock, which the ring never does.
        let _ = BlockQueue::clear(self);
    }

    fn len(&self) -> usize {
        BlockQueue::len(self).unwrap_or(0)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn get_contents(&self) -> Vec<u64> {
        self.snapshot().unwrap_or_default()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_zero_capacity_panics() {
        let _ = BlockQueue::<u32>::new(0);
    }

    #[test]
    fn test_with_config_rejects_zero() {
        let config = QueueConfig {
            capacity: 0,
            ..QueueConfig::default()
        };
        assert!(matches!(
            BlockQueue::<u32>::with_config(&config),
            Err(ConfigError::ZeroCapacity)
        ));
        let queue = BlockQueue::<u32>::with_config(&QueueConfig::legacy()).unwrap();
        assert_eq!(queue.capacity(), 1000);
        assert_eq!(queue.timed_pop_policy(), TimedPopPolicy::SingleAttempt);
    }

    #[test]
    fn test_default_capacity() {
        let queue: BlockQueue<String> = BlockQueue::default();
        assert_eq!(queue.capacity(), 1000);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_push_pop_with_full_rejection() {
        let queue = BlockQueue::new(2);
        queue.push("A").unwrap();
        queue.push("B").unwrap();
        assert!(queue.is_full().unwrap());

        let err = queue.push("C").unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), "C");

        assert_eq!(queue.pop().unwrap(), "A");
        queue.push("C").unwrap();
        assert_eq!(queue.front().unwrap(), "B");
        assert_eq!(queue.back().unwrap(), "C");
        assert_eq!(queue.len().unwrap(), 2);
    }

    #[test]
    fn test_wraparound_keeps_fifo() {
        let queue = BlockQueue::new(3);
        let mut expected = 0;
        for round in 0..10 {
            for i in 0..3 {
                queue.push(round * 3 + i).unwrap();
            }
            assert_eq!(queue.snapshot().unwrap(), vec![round * 3, round * 3 + 1, round * 3 + 2]);
            for _ in 0..3 {
                assert_eq!(queue.try_pop().unwrap(), expected);
                expected += 1;
            }
        }
        assert_eq!(queue.try_pop(), Err(QueueError::Empty));
    }

    #[test]
    fn test_peek_empty() {
        let queue: BlockQueue<u8> = BlockQueue::new(4);
        assert_eq!(queue.front(), Err(QueueError::Empty));
        assert_eq!(queue.back(), Err(QueueError::Empty));
        queue.push(1).unwrap();
        queue.try_pop().unwrap();
        assert_eq!(queue.front(), Err(QueueError::Empty));
        assert_eq!(queue.back(), Err(QueueError::Empty));
    }

    #[test]
    fn test_single_slot() {
        let queue = BlockQueue::new(1);
        queue.push(7).unwrap();
        assert!(queue.is_full().unwrap());
        assert_eq!(queue.front().unwrap(), queue.back().unwrap());
        assert!(queue.push(8).is_err());
        assert_eq!(queue.pop().unwrap(), 7);
        queue.push(8).unwrap();
        assert_eq!(queue.pop().unwrap(), 8);
    }

    #[test]
    fn test_clear_resets() {
        let queue = BlockQueue::new(3);
        for i in 1..=3 {
            queue.push(i).unwrap();
        }
        queue.clear().unwrap();
        assert!(queue.is_empty().unwrap());
        assert_eq!(queue.len().unwrap(), 0);
        assert_eq!(queue.front(), Err(QueueError::Empty));

        queue.push(9).unwrap();
        assert_eq!(queue.front().unwrap(), 9);
        assert_eq!(queue.back().unwrap(), 9);
        assert_eq!(queue.snapshot().unwrap(), vec![9]);
    }

    #[test]
    fn test_clear_drops_stale_items_on_overwrite() {
        let item = Arc::new(());
        let queue = BlockQueue::new(2);
        queue.push(Arc::clone(&item)).unwrap();
        queue.clear().unwrap();
        assert_eq!(Arc::strong_count(&item), 2);
        queue.push(Arc::new(())).unwrap();
        assert_eq!(Arc::strong_count(&item), 1);
    }

    #[test]
    fn test_drop_releases_items() {
        let item = Arc::new(());
        {
            let queue = BlockQueue::new(4);
            queue.push(Arc::clone(&item)).unwrap();
            queue.push(Arc::clone(&item)).unwrap();
            assert_eq!(Arc::strong_count(&item), 3);
        }
        assert_eq!(Arc::strong_count(&item), 1);
    }

    #[test]
    fn test_pop_timeout_empty() {
        for policy in [TimedPopPolicy::SingleAttempt, TimedPopPolicy::Deadline] {
            let queue: BlockQueue<u32> = BlockQueue::with_policy(5, policy);
            let start = Instant::now();
            assert_eq!(queue.pop_timeout_ms(50), Err(QueueError::Timeout));
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(45), "{:?}: {:?}", policy, elapsed);
            assert!(elapsed < Duration::from_secs(2), "{:?}: {:?}", policy, elapsed);
        }
    }

    #[test]
    fn test_pop_timeout_zero() {
        let queue = BlockQueue::new(2);
        assert_eq!(queue.pop_timeout(Duration::ZERO), Err(QueueError::Timeout));
        queue.push(3).unwrap();
        assert_eq!(queue.pop_timeout(Duration::ZERO), Ok(3));
    }

    #[test]
    fn test_pop_timeout_huge_behaves_like_pop() {
        let queue = BlockQueue::new(2);
        queue.push(1).unwrap();
        assert_eq!(queue.pop_timeout(Duration::MAX), Ok(1));
    }

    #[test]
    fn test_pop_timeout_receives_item() {
        let queue = Arc::new(BlockQueue::new(2));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(42).unwrap();
            })
        };
        assert_eq!(queue.pop_timeout(Duration::from_secs(5)), Ok(42));
        producer.join().unwrap();
    }

    #[test]
    fn test_deadline_policy_waits_for_late_item() {
        let queue = Arc::new(BlockQueue::with_policy(1, TimedPopPolicy::Deadline));
        queue.push(0).unwrap();
        assert_eq!(queue.try_pop(), Ok(0));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(1).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(1));
    }

    #[test]
    fn test_single_attempt_receives_item_pushed_while_waiting() {
        let queue = Arc::new(BlockQueue::with_policy(2, TimedPopPolicy::SingleAttempt));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let start = Instant::now();
                (queue.pop_timeout(Duration::from_secs(5)), start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(30));
        queue.push(7).unwrap();

        let (result, elapsed) = consumer.join().unwrap();
        assert_eq!(result, Ok(7));
        assert!(elapsed < Duration::from_secs(5), "{:?}", elapsed);
    }

    #[test]
    fn test_single_attempt_loser_times_out_before_deadline() {
        let deadline = Duration::from_secs(3);
        let queue = Arc::new(BlockQueue::with_policy(2, TimedPopPolicy::SingleAttempt));
        let barrier = Arc::new(Barrier::new(3));
        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let start = Instant::now();
                    (queue.pop_timeout(deadline), start.elapsed())
                })
            })
            .collect();

        barrier.wait();
        thread::sleep(Duration::from_millis(50));
        queue.push(1).unwrap();

        let mut outcomes: Vec<(Result<i32, QueueError>, Duration)> =
            consumers.into_iter().map(|c| c.join().unwrap()).collect();
        outcomes.sort_by_key(|(result, _)| result.is_err());

        assert_eq!(outcomes[0].0, Ok(1));
        // One broadcast wakes both; the loser gives up instead of waiting again.
        assert_eq!(outcomes[1].0, Err(QueueError::Timeout));
        assert!(outcomes[1].1 < Duration::from_secs(1), "{:?}", outcomes[1].1);
    }

    #[test]
    fn test_blocking_pop_wakes_on_push() {
        let queue = Arc::new(BlockQueue::new(4));
        let barrier = Arc::new(Barrier::new(2));
        let consumer = {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                queue.pop()
            })
        };
        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        queue.push("X").unwrap();
        assert_eq!(consumer.join().unwrap(), Ok("X"));
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_push_wakes_all_consumers() {
        let queue = Arc::new(BlockQueue::new(4));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        for i in 0..3 {
            queue.push(i).unwrap();
        }
        let mut got: Vec<u32> = consumers
            .into_iter()
            .map(|c| c.join().unwrap().unwrap())
            .collect();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[test]
    fn test_poisoned_lock_reports_wait_error() {
        let queue = Arc::new(BlockQueue::new(2));
        queue.push(1u32).unwrap();
        {
            let queue = Arc::clone(&queue);
            let _ = thread::spawn(move || {
                let _ring = queue.state.lock().unwrap();
                panic!("poison the ring");
            })
            .join();
        }

        assert!(matches!(queue.len(), Err(QueueError::Wait(_))));
        assert!(matches!(queue.try_pop(), Err(QueueError::Wait(_))));
        let err = queue.push(2).unwrap_err();
        assert!(matches!(err.kind(), QueueError::Wait(_)));
        assert_eq!(err.into_inner(), 2);
    }

    #[test]
    fn test_dst_testable_surface() {
        let queue = <BlockQueue<u64> as DstTestableQueue>::with_capacity(2);
        assert!(DstTestableQueue::push(&queue, 1));
        assert!(DstTestableQueue::push(&queue, 2));
        assert!(!DstTestableQueue::push(&queue, 3));
        assert_eq!(queue.get_contents(), vec![1, 2]);
        assert_eq!(DstTestableQueue::try_pop(&queue), Some(1));
        DstTestableQueue::clear(&queue);
        assert!(DstTestableQueue::is_empty(&queue));

        assert_eq!(
            DstTestableQueue::pop_timeout(&queue, Duration::from_millis(10)),
            None
        );
        assert!(DstTestableQueue::push(&queue, 4));
        assert_eq!(DstTestableQueue::pop(&queue), Some(4));
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_push_then_pop() {
        loom::model(|| {
            let queue = Arc::new(BlockQueue::new(2));

            let producer = {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.push(1).is_ok())
            };
            let consumer = {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            };

            assert!(producer.join().unwrap());
            assert_eq!(consumer.join().unwrap(), Ok(1));
            assert_eq!(queue.len(), Ok(0));
        });
    }

    #[test]
    fn loom_two_consumers_each_get_one() {
        loom::model(|| {
            let queue = Arc::new(BlockQueue::new(2));

            let consumers: Vec<_> = (0..2)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || queue.pop())
                })
                .collect();

            queue.push(1).unwrap();
            queue.push(2).unwrap();

            let mut got: Vec<i32> = consumers
                .into_iter()
                .map(|c| c.join().unwrap().unwrap())
                .collect();
            got.sort_unstable();
            assert_eq!(got, vec![1, 2]);
        });
    }

    #[test]
    fn loom_full_reject_returns_item() {
        loom::model(|| {
            let queue = Arc::new(BlockQueue::new(1));

            let pushers: Vec<_> = (1..=2)
                .map(|i| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || queue.push(i).map_err(PushError::into_inner))
                })
                .collect();

            let results: Vec<Result<(), i32>> =
                pushers.into_iter().map(|p| p.join().unwrap()).collect();
            let accepted = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(accepted, 1);

            let rejected = results.into_iter().find_map(Result::err).unwrap();
            let queued = queue.try_pop().unwrap();
            assert_eq!(queued + rejected, 3);
        });
    }

    #[test]
    fn loom_timed_pop_sees_push() {
        loom::model(|| {
            let queue = Arc::new(BlockQueue::with_policy(1, TimedPopPolicy::Deadline));

            let consumer = {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop_timeout(Duration::from_secs(60)))
            };
            queue.push(5).unwrap();

            assert_eq!(consumer.join().unwrap(), Ok(5));
        });
    }
}
