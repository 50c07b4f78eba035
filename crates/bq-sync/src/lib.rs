//! # bq-sync
//!
//! Thin wrappers over the platform synchronization primitives:
//!
//! - `Locker<T>`: mutual exclusion; the guard it returns is the handle a
//!   `Cond` waits with
//! - `Cond`: condition variable with untimed and deadline waits
//! - `Sem`: counting semaphore
//!
//! Every operation reports failure as a `SyncError` instead of panicking.
//!
//! # Loom
//!
//! Under `--cfg loom` the wrappers are backed by `loom::sync`, so anything
//! built on them can be model-checked:
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test -p bq-sync --release
//! ```
//!
//! Loom does not model time; deadline waits only return once notified.

mod cond;
mod error;
mod locker;
mod sem;

pub use cond::{Cond, WaitStatus};
pub use error::SyncError;
pub use locker::{Locker, LockerGuard};
pub use sem::Sem;

#[cfg(loom)]
pub(crate) use loom::sync::{Condvar, Mutex, MutexGuard};

#[cfg(not(loom))]
pub(crate) use std::sync::{Condvar, Mutex, MutexGuard};
