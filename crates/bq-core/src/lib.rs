//! # bq-core
//!
//! Core types and invariants for verifying the bounded blocking queue.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample`, the operation trace behind a failed invariant
//! - `QueueProperties`, the observable state a queue exposes to its checker

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, TraceStep};
pub use invariants::{QueueHistory, QueueOpType, QueueProperties, QueuePropertyChecker};
pub use property::{PropertyChecker, PropertyResult};
