//! Bounded FIFO queue invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostItems | Every accepted item is queued, consumed, or discarded by clear |
//! | NoPhantomItems | Nothing is consumed or queued that was never accepted |
//! | NoDuplicates | No item is delivered or queued twice |
//! | FIFO_Order | Replaying the history against a model queue matches every pop |
//! | BoundedCapacity | The queue never holds more than its capacity |
//!
//! Items are `u64` tags that producers keep unique, so set membership
//! identifies an item.

use std::collections::{HashSet, VecDeque};

use crate::counterexample::{Counterexample, TraceStep};
use crate::property::{PropertyChecker, PropertyResult};

/// Observable state that any bounded queue implementation exposes for checking.
pub trait QueueProperties {
    /// Items accepted by `push`, in acceptance order.
    fn produced_items(&self) -> Vec<u64>;

    /// Items returned by `pop`, in the order they were returned.
    fn consumed_items(&self) -> Vec<u64>;

    /// Items currently in the queue (front to back).
    fn current_contents(&self) -> Vec<u64>;

    /// Items dropped by `clear`.
    fn discarded_items(&self) -> Vec<u64> {
        Vec::new()
    }

    /// Fixed capacity.
    fn capacity(&self) -> u64;

    /// Operation history. Owned, so implementations can keep it behind a lock.
    fn history(&self) -> QueueHistory;
}

/// History of queue operations in linearization order.
#[derive(Debug, Clone, Default)]
pub struct QueueHistory {
    pub operations: Vec<QueueOperation>,
}

/// A single queue operation.
#[derive(Debug, Clone)]
pub struct QueueOperation {
    pub thread_id: u64,
    pub op_type: QueueOpType,
    /// Item pushed, or item returned by a pop
    pub item: Option<u64>,
    pub step: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOpType {
    Push,
    /// Push rejected because the queue was full
    PushRejected,
    Pop,
    /// Non-blocking pop on an empty queue
    PopEmpty,
    Clear,
}

impl QueueHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, thread_id: u64, op_type: QueueOpType, item: Option<u64>, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        debug_assert!(
            self.operations.last().map_or(true, |last| step > last.step),
            "Steps must be increasing"
        );
        self.operations.push(QueueOperation {
            thread_id,
            op_type,
            item,
            step,
        });
    }

    pub fn record_push(&mut self, thread_id: u64, item: u64, step: u64) {
        self.record(thread_id, QueueOpType::Push, Some(item), step);
    }

    pub fn record_push_rejected(&mut self, thread_id: u64, item: u64, step: u64) {
        self.record(thread_id, QueueOpType::PushRejected, Some(item), step);
    }

    /// Record a pop; `None` means the queue was empty.
    pub fn record_pop(&mut self, thread_id: u64, item: Option<u64>, step: u64) {
        let op_type = if item.is_some() {
            QueueOpType::Pop
        } else {
            QueueOpType::PopEmpty
        };
        self.record(thread_id, op_type, item, step);
    }

    pub fn record_clear(&mut self, thread_id: u64, step: u64) {
        self.record(thread_id, QueueOpType::Clear, None, step);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Build a counterexample from the operations up to and including `step`.
    pub fn to_counterexample(&self, seed: Option<u64>, step: u64) -> Counterexample {
        let mut ce = Counterexample::new(seed);
        let mut len = 0usize;
        for op in self.operations.iter().take_while(|op| op.step <= step) {
            let action = match (op.op_type, op.item) {
                (QueueOpType::Push, Some(item)) => format!("push({})", item),
                (QueueOpType::PushRejected, Some(item)) => format!("push({}) rejected", item),
                (QueueOpType::Pop, Some(item)) => format!("pop -> {}", item),
                (QueueOpType::Clear, _) => "clear".to_string(),
                _ => "pop -> empty".to_string(),
            };
            len = match op.op_type {
                QueueOpType::Push => len + 1,
                QueueOpType::Pop => len.saturating_sub(1),
                QueueOpType::Clear => 0,
                QueueOpType::PushRejected | QueueOpType::PopEmpty => len,
            };
            ce.push_step(TraceStep {
                step: op.step,
                thread_id: op.thread_id,
                action,
                model_len: len,
            });
        }
        ce
    }
}

/// Property checker for bounded queue implementations.
pub struct QueuePropertyChecker<'a, T: QueueProperties> {
    queue: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: QueueProperties> QueuePropertyChecker<'a, T> {
    pub fn new(queue: &'a T) -> Self {
        Self {
            queue,
            dst_seed: None,
        }
    }

    /// Set DST seed for counterexample reproduction.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    /// Every accepted item is in the queue, was consumed, or was cleared.
    pub fn check_no_lost_items(&self) -> PropertyResult {
        let produced = self.queue.produced_items();
        let consumed = self.queue.consumed_items();
        let contents = self.queue.current_contents();
        let discarded = self.queue.discarded_items();
        let accounted: HashSet<u64> = consumed
            .iter()
            .chain(&contents)
            .chain(&discarded)
            .copied()
            .collect();

        let Some(lost) = produced.iter().find(|item| !accounted.contains(*item)) else {
            return PropertyResult::pass("NoLostItems");
        };
        let mut ce =
            Counterexample::new(self.dst_seed).with_description(format!("item {} lost", lost));
        ce.observe("produced", &produced);
        ce.observe("consumed", &consumed);
        ce.observe("contents", &contents);
        PropertyResult::fail(
            "NoLostItems",
            format!("Item {} was accepted but is neither queued nor consumed", lost),
            Some(ce),
        )
    }

    /// Consumed and queued items all come from accepted pushes.
    pub fn check_no_phantom_items(&self) -> PropertyResult {
        let produced: HashSet<u64> = self.queue.produced_items().into_iter().collect();

        let consumed = self.queue.consumed_items();
        let contents = self.queue.current_contents();
        if let Some(item) = consumed.iter().chain(&contents).find(|i| !produced.contains(*i)) {
            return PropertyResult::fail(
                "NoPhantomItems",
                format!("Item {} was delivered but never accepted", item),
                None,
            );
        }

        PropertyResult::pass("NoPhantomItems")
    }

    /// No item is consumed twice, queued twice, or both consumed and queued.
    pub fn check_no_duplicates(&self) -> PropertyResult {
        let mut seen = HashSet::new();
        let consumed = self.queue.consumed_items();
        let contents = self.queue.current_contents();

        for item in consumed.iter().chain(&contents) {
            if !seen.insert(*item) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("Item {} was delivered or queued more than once", item),
                    None,
                );
            }
        }

        PropertyResult::pass("NoDuplicates")
    }

    /// Replay the history against a model queue of the same capacity.
    ///
    /// Exact when a single consumer records its pops in the order it
    /// performed them; the history must be in linearization order.
    pub fn check_fifo_order(&self) -> PropertyResult {
        let history = self.queue.history();
        let capacity = self.queue.capacity() as usize;
        let mut model: VecDeque<u64> = VecDeque::with_capacity(capacity);

        for op in &history.operations {
            let failure = match op.op_type {
                QueueOpType::Push => {
                    if model.len() >= capacity {
                        Some(format!(
                            "push({:?}) accepted while model holds {} of {} (step {})",
                            op.item,
                            model.len(),
                            capacity,
                            op.step
                        ))
                    } else {
                        model.extend(op.item);
                        None
                    }
                }
                QueueOpType::PushRejected => (model.len() < capacity).then(|| {
                    format!(
                        "push({:?}) rejected while model holds {} of {} (step {})",
                        op.item,
                        model.len(),
                        capacity,
                        op.step
                    )
                }),
                QueueOpType::Pop => match (model.pop_front(), op.item) {
                    (Some(expected), Some(actual)) if expected != actual => Some(format!(
                        "pop returned {} but model expected {} (step {})",
                        actual, expected, op.step
                    )),
                    (None, Some(actual)) => Some(format!(
                        "pop returned {} but model was empty (step {})",
                        actual, op.step
                    )),
                    _ => None,
                },
                QueueOpType::PopEmpty => (!model.is_empty()).then(|| {
                    format!(
                        "pop found the queue empty but model holds {} items (step {})",
                        model.len(),
                        op.step
                    )
                }),
                QueueOpType::Clear => {
                    model.clear();
                    None
                }
            };

            if let Some(violation) = failure {
                let ce = history
                    .to_counterexample(self.dst_seed, op.step)
                    .with_description(violation.clone());
                return PropertyResult::fail("FIFO_Order", violation, Some(ce));
            }
        }

        PropertyResult::pass("FIFO_Order")
    }

    pub fn check_bounded_capacity(&self) -> PropertyResult {
        let contents = self.queue.current_contents();
        let capacity = self.queue.capacity();

        if contents.len() as u64 > capacity {
            return PropertyResult::fail(
                "BoundedCapacity",
                format!(
                    "Queue contains {} items but capacity is {}",
                    contents.len(),
                    capacity
                ),
                None,
            );
        }

        PropertyResult::pass("BoundedCapacity")
    }
}

impl<T: QueueProperties> PropertyChecker for QueuePropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_items(),
            self.check_no_phantom_items(),
            self.check_no_duplicates(),
            self.check_fifo_order(),
            self.check_bounded_capacity(),
        ]
    }
}
