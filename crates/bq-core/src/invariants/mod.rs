//! Invariant traits for bounded queues.
//!
//! - `queue`: NoLostItems, NoPhantomItems, NoDuplicates, FIFO_Order, BoundedCapacity

pub mod queue;

pub use queue::{
    QueueHistory, QueueOpType, QueueOperation, QueueProperties, QueuePropertyChecker,
};
