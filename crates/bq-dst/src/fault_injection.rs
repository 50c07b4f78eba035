//! Fault injection for bounded queues.
//!
//! Faults land at operation boundaries, never inside a queue operation.
//! The queue under test stays unmodified; the runner decides before and
//! after each call whether the calling "thread" crashes, stalls or is
//! preempted.
//!
//! | Fault | Before the call | After the call |
//! |-------|-----------------|----------------|
//! | ThreadCrash | operation never starts (`abandoned_operations`) | effect stands, caller never sees it (`lost_results`) |
//! | Delay | simulated time advances | simulated time advances |
//! | Preemption | counted, operation proceeds | not injected |
//!
//! `PopTimeout` goes through the queue's own timed wait with a real
//! deadline, so a scenario exercises the condition-variable path too.

use std::thread;
use std::time::{Duration, Instant};

use bq_core::{
    PropertyChecker, PropertyResult, QueueHistory, QueueProperties, QueuePropertyChecker,
};

use crate::clock::SimClock;
use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;

/// Where a fault is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    BeforeOperation,
    AfterOperation,
}

impl FaultPoint {
    /// Faults that make sense at this boundary.
    fn candidates(self) -> &'static [FaultType] {
        match self {
            Self::BeforeOperation => &[
                FaultType::ThreadCrash,
                FaultType::Delay,
                FaultType::Preemption,
            ],
            // Preempting a finished call is the next call's BeforeOperation.
            Self::AfterOperation => &[FaultType::ThreadCrash, FaultType::Delay],
        }
    }
}

/// Kinds of injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// The calling thread dies at the boundary
    ThreadCrash,
    /// The calling thread stalls
    Delay,
    /// Another thread gets to run first
    Preemption,
}

/// Queue surface the runner and harness drive.
///
/// Items are `u64` tags; callers keep them unique.
pub trait DstTestableQueue: Send + Sync {
    fn with_capacity(capacity: usize) -> Self;

    /// Append; `false` when the queue is full.
    fn push(&self, item: u64) -> bool;

    /// Remove the front item without blocking.
    fn try_pop(&self) -> Option<u64>;

    /// Remove the front item, blocking until one arrives.
    ///
    /// The default polls `try_pop`; queues with a real wait override it.
    fn pop(&self) -> Option<u64> {
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            thread::yield_now();
        }
    }

    /// Remove the front item, waiting at most `timeout`.
    ///
    /// The default polls `try_pop` until the deadline.
    fn pop_timeout(&self, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return None;
            }
            thread::yield_now();
        }
    }

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    /// Items front to back.
    fn get_contents(&self) -> Vec<u64>;
}

/// Operation in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstOp {
    Push(u64),
    /// Non-blocking pop
    Pop,
    /// Timed pop with a real deadline, in milliseconds
    PopTimeout(u64),
    Clear,
}

/// Runs queue operations with faults at their boundaries and records
/// everything the invariant checker needs.
pub struct DstRunner<Q> {
    queue: Q,
    rng: DeterministicRng,
    fault_injector: FaultInjector,
    clock: SimClock,
    seed: u64,
    thread_id: u64,
    step: u64,
    produced: Vec<u64>,
    consumed: Vec<u64>,
    discarded: Vec<u64>,
    history: QueueHistory,
    stats: DstStats,
}

impl<Q: DstTestableQueue> DstRunner<Q> {
    pub fn new(seed: u64, capacity: usize) -> Self {
        Self::with_fault_config(seed, capacity, FaultConfig::default())
    }

    pub fn with_fault_config(seed: u64, capacity: usize, config: FaultConfig) -> Self {
        debug_assert!(capacity > 0, "Capacity must be positive");
        Self {
            queue: Q::with_capacity(capacity),
            rng: DeterministicRng::new(seed),
            fault_injector: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), config),
            clock: SimClock::new(),
            seed,
            thread_id: 0,
            step: 0,
            produced: Vec::new(),
            consumed: Vec::new(),
            discarded: Vec::new(),
            history: QueueHistory::new(),
            stats: DstStats {
                seed,
                ..DstStats::default()
            },
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Attribute subsequent operations to `thread_id`.
    pub fn set_thread(&mut self, thread_id: u64) {
        self.thread_id = thread_id;
    }

    fn next_step(&mut self) -> u64 {
        self.step += 1;
        self.stats.operations_count += 1;
        self.step
    }

    /// Push with faults at the boundaries. `Ok(false)` means the queue was full.
    pub fn push(&mut self, item: u64) -> Result<bool, FaultType> {
        debug_assert!(
            !self.produced.contains(&item),
            "Item tags must be unique: {}",
            item
        );
        self.boundary(FaultPoint::BeforeOperation)?;

        let accepted = self.queue.push(item);
        let step = self.next_step();
        if accepted {
            self.produced.push(item);
            self.history.record_push(self.thread_id, item, step);
        } else {
            self.stats.rejected_pushes += 1;
            self.history.record_push_rejected(self.thread_id, item, step);
        }

        self.boundary(FaultPoint::AfterOperation)?;
        Ok(accepted)
    }

    /// Non-blocking pop with faults at the boundaries.
    pub fn pop(&mut self) -> Result<Option<u64>, FaultType> {
        self.boundary(FaultPoint::BeforeOperation)?;
        let item = self.queue.try_pop();
        self.record_pop(item);
        // A crash here loses the item for the caller, not for the queue.
        self.boundary(FaultPoint::AfterOperation)?;
        Ok(item)
    }

    /// Timed pop through the queue's own wait.
    ///
    /// Nothing else runs during the wait, so an empty queue always times
    /// out after `timeout_ms` of real time.
    pub fn pop_timeout(&mut self, timeout_ms: u64) -> Result<Option<u64>, FaultType> {
        self.boundary(FaultPoint::BeforeOperation)?;
        let item = self.queue.pop_timeout(Duration::from_millis(timeout_ms));
        if item.is_none() {
            self.stats.timed_out_pops += 1;
        }
        self.record_pop(item);
        self.boundary(FaultPoint::AfterOperation)?;
        Ok(item)
    }

    fn record_pop(&mut self, item: Option<u64>) {
        let step = self.next_step();
        match item {
            Some(item) => self.consumed.push(item),
            None => self.stats.empty_pops += 1,
        }
        self.history.record_pop(self.thread_id, item, step);
    }

    pub fn clear(&mut self) -> Result<(), FaultType> {
        self.boundary(FaultPoint::BeforeOperation)?;

        let dropped = self.queue.get_contents();
        self.queue.clear();
        let step = self.next_step();
        self.discarded.extend(dropped);
        self.history.record_clear(self.thread_id, step);

        self.boundary(FaultPoint::AfterOperation)?;
        Ok(())
    }

    /// Run one scenario operation.
    pub fn apply(&mut self, op: DstOp) -> Result<(), FaultType> {
        match op {
            DstOp::Push(item) => self.push(item).map(drop),
            DstOp::Pop => self.pop().map(drop),
            DstOp::PopTimeout(ms) => self.pop_timeout(ms).map(drop),
            DstOp::Clear => self.clear(),
        }
    }

    /// Decide on a fault at `point`; only a crash interrupts the caller.
    fn boundary(&mut self, point: FaultPoint) -> Result<(), FaultType> {
        let Some(fault) = self.maybe_inject_fault(point) else {
            return Ok(());
        };
        self.stats.faults_injected += 1;
        tracing::trace!(seed = self.seed, ?point, ?fault, "fault injected");
        match (fault, point) {
            (FaultType::ThreadCrash, FaultPoint::BeforeOperation) => {
                self.stats.abandoned_operations += 1;
                Err(fault)
            }
            (FaultType::ThreadCrash, FaultPoint::AfterOperation) => {
                self.stats.lost_results += 1;
                Err(fault)
            }
            (FaultType::Delay, _) => {
                let us = self.rng.gen_range(1..1_000u64);
                self.clock.advance_us(us);
                Ok(())
            }
            (FaultType::Preemption, _) => Ok(()),
        }
    }

    fn maybe_inject_fault(&mut self, point: FaultPoint) -> Option<FaultType> {
        if !self.fault_injector.should_fail() {
            return None;
        }
        self.rng.choose(point.candidates()).copied()
    }

    /// Evaluate every queue invariant against what the runner recorded.
    pub fn check_invariants(&self) -> Vec<PropertyResult> {
        let checker = QueuePropertyChecker::new(self);
        if self.seed == 0 {
            checker.check_all()
        } else {
            checker.with_seed(self.seed).check_all()
        }
    }

    pub fn stats(&self) -> DstStats {
        self.stats
    }
}

impl<Q: DstTestableQueue> QueueProperties for DstRunner<Q> {
    fn produced_items(&self) -> Vec<u64> {
        self.produced.clone()
    }

    fn consumed_items(&self) -> Vec<u64> {
        self.consumed.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.queue.get_contents()
    }

    fn discarded_items(&self) -> Vec<u64> {
        self.discarded.clone()
    }

    fn capacity(&self) -> u64 {
        self.queue.capacity() as u64
    }

    fn history(&self) -> QueueHistory {
        self.history.clone()
    }
}

/// Statistics from a DST run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DstStats {
    pub seed: u64,
    /// Operations that reached the queue
    pub operations_count: u64,
    pub faults_injected: u64,
    /// Crashed before reaching the queue
    pub abandoned_operations: u64,
    /// Crashed after the queue applied them
    pub lost_results: u64,
    pub rejected_pushes: u64,
    /// Pops that returned nothing, timed or not
    pub empty_pops: u64,
    pub timed_out_pops: u64,
}

impl DstStats {
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} ops={} faults={} abandoned={} lost_results={} rejected={} empty_pops={} timeouts={}",
            self.seed,
            self.operations_count,
            self.faults_injected,
            self.abandoned_operations,
            self.lost_results,
            self.rejected_pushes,
            self.empty_pops,
            self.timed_out_pops
        )
    }
}

/// Outcome of `run_dst_scenario`.
#[derive(Debug)]
pub struct DstResult {
    pub passed: bool,
    /// Failing invariants only
    pub violations: Vec<PropertyResult>,
    pub stats: DstStats,
    pub fault_errors: Vec<String>,
}

impl DstResult {
    pub fn format(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut result = format!("[{}] {}", status, self.stats.format());
        for violation in &self.violations {
            result.push_str(&format!("\n  VIOLATION: {}", violation));
        }
        result
    }
}

/// Run `operations` against a fresh queue and check every invariant at the end.
pub fn run_dst_scenario<Q: DstTestableQueue>(
    seed: u64,
    capacity: usize,
    operations: &[DstOp],
) -> DstResult {
    run_dst_scenario_with::<Q>(seed, capacity, FaultConfig::default(), operations)
}

/// Like `run_dst_scenario`, with explicit fault probabilities.
pub fn run_dst_scenario_with<Q: DstTestableQueue>(
    seed: u64,
    capacity: usize,
    config: FaultConfig,
    operations: &[DstOp],
) -> DstResult {
    let mut runner: DstRunner<Q> = DstRunner::with_fault_config(seed, capacity, config);
    let mut fault_errors = Vec::new();

    for op in operations {
        // Faults are part of the scenario.
        if let Err(fault) = runner.apply(*op) {
            fault_errors.push(format!("{:?} during {:?}", fault, op));
        }
    }

    let violations: Vec<PropertyResult> = runner
        .check_invariants()
        .into_iter()
        .filter(|r| !r.holds)
        .collect();
    let stats = runner.stats();
    tracing::debug!(
        seed,
        ops = stats.operations_count,
        faults = stats.faults_injected,
        violations = violations.len(),
        "dst scenario finished"
    );

    DstResult {
        passed: violations.is_empty(),
        violations,
        stats,
        fault_errors,
    }
}

/// Random scenario of `count` operations. Pushes carry unique tags starting at 1.
///
/// Timed pops wait at most 2 ms each.
pub fn random_ops(seed: u64, count: usize) -> Vec<DstOp> {
    let mut rng = DeterministicRng::new(seed);
    let mut next_item = 1u64;
    let mut ops = Vec::with_capacity(count);
    for _ in 0..count {
        let op = match rng.gen_range(0..20u8) {
            0 => DstOp::Clear,
            1..=10 => {
                next_item += 1;
                DstOp::Push(next_item - 1)
            }
            11 => DstOp::PopTimeout(rng.gen_range(0..=2u64)),
            _ => DstOp::Pop,
        };
        ops.push(op);
    }
    ops
}
