//! Intentionally broken bounded queues.
//!
//! Each one has a single bug that a specific invariant must catch. They
//! exist to show the checkers are not vacuous.
//!
//! | Queue | Bug | Caught by |
//! |-------|-----|-----------|
//! | LifoQueue | pops the newest item | FIFO_Order |
//! | OverwritingQueue | a full push evicts the oldest item and reports success | NoLostItems |
//! | UnboundedQueue | ignores capacity | BoundedCapacity |

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bq_core::{QueueHistory, QueueProperties};
use bq_dst::DstTestableQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bug {
    PopsNewest,
    OverwritesOldest,
    IgnoresCapacity,
}

#[derive(Default)]
struct BuggyState {
    items: VecDeque<u64>,
    produced: Vec<u64>,
    consumed: Vec<u64>,
    discarded: Vec<u64>,
    history: QueueHistory,
    step: u64,
}

impl BuggyState {
    fn next_step(&mut self) -> u64 {
        self.step += 1;
        self.step
    }
}

struct BuggyQueue {
    bug: Bug,
    capacity: usize,
    state: Mutex<BuggyState>,
}

impl BuggyQueue {
    fn new(bug: Bug, capacity: usize) -> Self {
        Self {
            bug,
            capacity,
            state: Mutex::new(BuggyState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BuggyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, item: u64) -> bool {
        let mut state = self.state();
        let step = state.next_step();
        if state.items.len() >= self.capacity {
            match self.bug {
                // BUG: silently evicts an accepted item.
                Bug::OverwritesOldest => {
                    state.items.pop_front();
                }
                // BUG: no bound at all.
                Bug::IgnoresCapacity => {}
                Bug::PopsNewest => {
                    state.history.record_push_rejected(0, item, step);
                    return false;
                }
            }
        }
        state.items.push_back(item);
        state.produced.push(item);
        state.history.record_push(0, item, step);
        true
    }

    fn try_pop(&self) -> Option<u64> {
        let mut state = self.state();
        let item = match self.bug {
            // BUG: stack order.
            Bug::PopsNewest => state.items.pop_back(),
            _ => state.items.pop_front(),
        };
        let step = state.next_step();
        state.consumed.extend(item);
        state.history.record_pop(1, item, step);
        item
    }

    fn clear(&self) {
        let mut state = self.state();
        let step = state.next_step();
        let dropped: Vec<u64> = state.items.drain(..).collect();
        state.discarded.extend(dropped);
        state.history.record_clear(1, step);
    }
}

macro_rules! buggy_queue {
    ($(#[$meta:meta])* $name:ident, $bug:expr) => {
        $(#[$meta])*
        pub struct $name(BuggyQueue);

        impl $name {
            pub fn new(capacity: usize) -> Self {
                Self(BuggyQueue::new($bug, capacity))
            }
        }

        impl DstTestableQueue for $name {
            fn with_capacity(capacity: usize) -> Self {
                Self::new(capacity)
            }

            fn push(&self, item: u64) -> bool {
                self.0.push(item)
            }

            fn try_pop(&self) -> Option<u64> {
                self.0.try_pop()
            }

            fn clear(&self) {
                self.0.clear();
            }

            fn len(&self) -> usize {
                self.0.state().items.len()
            }

            fn capacity(&self) -> usize {
                self.0.capacity
            }

            fn get_contents(&self) -> Vec<u64> {
                self.0.state().items.iter().copied().collect()
            }
        }

        impl QueueProperties for $name {
            fn produced_items(&self) -> Vec<u64> {
                self.0.state().produced.clone()
            }

            fn consumed_items(&self) -> Vec<u64> {
                self.0.state().consumed.clone()
            }

            fn current_contents(&self) -> Vec<u64> {
                self.0.state().items.iter().copied().collect()
            }

            fn discarded_items(&self) -> Vec<u64> {
                self.0.state().discarded.clone()
            }

            fn capacity(&self) -> u64 {
                self.0.capacity as u64
            }

            fn history(&self) -> QueueHistory {
                self.0.state().history.clone()
            }
        }
    };
}

buggy_queue!(
    /// Pops the most recently pushed item.
    LifoQueue,
    Bug::PopsNewest
);

buggy_queue!(
    /// Evicts the oldest item when a push finds the queue full.
    OverwritingQueue,
    Bug::OverwritesOldest
);

buggy_queue!(
    /// Never rejects a push.
    UnboundedQueue,
    Bug::IgnoresCapacity
);
