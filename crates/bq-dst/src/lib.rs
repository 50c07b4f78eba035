//! # bq-dst
//!
//! Deterministic Simulation Testing for bounded queues.
//!
//! Time, randomness, faults and thread scheduling are all simulated and
//! derived from a single seed, so any failing run can be replayed.
//!
//! ## Usage
//!
//! ```rust
//! use bq_dst::DstEnv;
//!
//! let mut env = DstEnv::new(12345);
//!
//! env.clock().advance_ms(1);
//! let choice = env.rng().gen_range(0..10u64);
//! assert!(choice < 10);
//!
//! if env.fault().should_fail() {
//!     // drop the operation
//! }
//! ```
//!
//! ## Reproducibility
//!
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

pub mod clock;
pub mod env;
pub mod fault;
pub mod fault_injection;
pub mod harness;
pub mod random;
pub mod scheduler;

pub use clock::SimClock;
pub use env::{DstEnv, EnvStats};
pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use fault_injection::{
    random_ops, run_dst_scenario, run_dst_scenario_with, DstOp, DstResult, DstRunner, DstStats,
    DstTestableQueue, FaultPoint, FaultType,
};
pub use harness::{DstHarness, HarnessConfig, HarnessResult};
pub use random::DeterministicRng;
pub use scheduler::{ScheduleDecision, Scheduler};

/// Seed from `DST_SEED`, or a fresh random one.
///
/// The seed is printed so a failing run can be replayed. An unparsable
/// `DST_SEED` is reported and replaced by a random seed.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("DST_SEED") {
        Ok(s) => match s.trim().parse::<u64>() {
            Ok(seed) => {
                println!("DST_SEED={} (from environment)", seed);
                seed
            }
            Err(e) => {
                tracing::warn!(value = %s, error = %e, "ignoring invalid DST_SEED");
                random_seed()
            }
        },
        Err(_) => random_seed(),
    }
}

fn random_seed() -> u64 {
    // Zero is reserved for "no seed".
    let seed = rand::random::<u64>().max(1);
    println!("DST_SEED={} (randomly generated)", seed);
    seed
}

/// Iteration count from `DST_ITERATIONS`, or `default`.
pub fn iterations_from_env(default: u64) -> u64 {
    std::env::var("DST_ITERATIONS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
