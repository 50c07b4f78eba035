//! # bq-queue
//!
//! Bounded blocking queue over a circular buffer, shared between producer
//! and consumer threads.
//!
//! # Modules
//!
//! - `block_queue`: the queue itself
//! - `config`: capacity and timed-pop policy, from TOML or `BLOCKQ_*` variables
//! - `error`: `QueueError`, `PushError`, `ConfigError`
//! - `tracked`: a recording wrapper checked by `bq_core::QueuePropertyChecker`
//! - `buggy_queues`: intentionally broken queues the checkers must reject

pub mod block_queue;
pub mod buggy_queues;
pub mod config;
pub mod error;
pub mod tracked;

pub use block_queue::BlockQueue;
pub use buggy_queues::{LifoQueue, OverwritingQueue, UnboundedQueue};
pub use config::{QueueConfig, TimedPopPolicy, CAPACITY_DEFAULT};
pub use error::{ConfigError, PushError, QueueError};
pub use tracked::TrackedQueue;
