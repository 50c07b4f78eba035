//! Multi-thread queue runs.
//!
//! Two drivers share one configuration:
//!
//! - [`DstHarness::run_queue`] simulates the threads. A seeded scheduler
//!   picks which producer or consumer acts next, so a seed replays the
//!   exact interleaving, and invariants are checked every few steps.
//! - [`DstHarness::run_threaded`] uses real OS threads against the queue's
//!   blocking and timed pops. The seed fixes each thread's choices and
//!   faults but not the OS interleaving.
//!
//! Producer `t` tags its `n`th item `(t << 32) | n`, so tags never repeat
//! and every tag names its producer.

use std::fmt;
use std::thread;
use std::time::Duration;

use bq_core::{PropertyResult, QueueHistory, QueueProperties, QueuePropertyChecker};

use crate::fault::{FaultConfig, FaultInjector};
use crate::fault_injection::{DstOp, DstRunner, DstTestableQueue, FaultType};
use crate::random::DeterministicRng;
use crate::scheduler::ScheduleDecision;
use crate::DstEnv;

/// Pushed once per consumer after every producer is done.
const STOP_TAG: u64 = u64::MAX;

/// Configuration for the harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of threads; even ids produce, odd ids consume
    pub threads_count: usize,
    /// Operations per simulated thread, items per real producer
    pub operations_per_thread: u64,
    /// Probability of a context switch after a simulated step
    pub yield_probability: f64,
    pub fault_config: FaultConfig,
    /// Check invariants after every N simulated operations (0 = only at the end)
    pub invariant_check_interval: u64,
    /// Probability that a simulated consumer step clears the queue
    pub clear_probability: f64,
    /// Probability that a real consumer uses a blocking pop instead of a timed one
    pub blocking_pop_probability: f64,
    /// Upper bound of a real consumer's timed pop, in milliseconds
    pub pop_timeout_ms_max: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 100,
            yield_probability: 0.2,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 10,
            clear_probability: 0.02,
            blocking_pop_probability: 0.5,
            pop_timeout_ms_max: 2,
        }
    }
}

impl HarnessConfig {
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 1000,
            yield_probability: 0.3,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 100,
            clear_probability: 0.01,
            blocking_pop_probability: 0.3,
            pop_timeout_ms_max: 1,
        }
    }

    /// Two threads, no faults, no clears.
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            yield_probability: 0.1,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 10,
            clear_probability: 0.0,
            blocking_pop_probability: 0.5,
            pop_timeout_ms_max: 2,
        }
    }
}

/// Result of a harness run.
#[derive(Debug, Clone, Default)]
pub struct HarnessResult {
    /// Seed used for reproduction
    pub seed: u64,
    pub operations_count: u64,
    /// Simulated runs only
    pub context_switches_count: u64,
    pub faults_injected_count: u64,
    /// Timed pops that returned nothing
    pub timeouts_count: u64,
    pub invariant_checks_count: u64,
    pub first_violation: Option<String>,
}

impl HarnessResult {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn passed(&self) -> bool {
        self.first_violation.is_none()
    }

    /// Count a check and keep its first failure.
    fn check(&mut self, outcome: Result<(), String>) -> bool {
        self.invariant_checks_count += 1;
        match outcome {
            Ok(()) => true,
            Err(violation) => {
                self.first_violation.get_or_insert(violation);
                false
            }
        }
    }
}

impl fmt::Display for HarnessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed() { "PASS" } else { "FAIL" };
        write!(
            f,
            "[{}] DST_SEED={} ops={} switches={} faults={} timeouts={} checks={}",
            status,
            self.seed,
            self.operations_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.timeouts_count,
            self.invariant_checks_count
        )?;
        if let Some(violation) = &self.first_violation {
            write!(f, "\n  Violation: {}", violation)?;
        }
        Ok(())
    }
}

/// Drives producer and consumer threads against one queue.
#[derive(Debug, Clone)]
pub struct DstHarness {
    seed: u64,
    config: HarnessConfig,
}

impl DstHarness {
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        debug_assert!(seed != 0, "Seed should not be zero");
        debug_assert!(
            (1..=16).contains(&config.threads_count),
            "threads_count out of range: {}",
            config.threads_count
        );
        Self { seed, config }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Simulated run: producers push, consumers pop without blocking and
    /// occasionally clear. Stops at the first invariant violation.
    pub fn run_queue<Q: DstTestableQueue>(&self, capacity: usize) -> HarnessResult {
        let config = &self.config;
        let mut env = DstEnv::with_scheduler_config(
            self.seed,
            config.threads_count,
            config.yield_probability,
            config.fault_config.clone(),
        );
        let mut runner: DstRunner<Q> =
            DstRunner::with_fault_config(self.seed, capacity, config.fault_config.clone());
        let mut steps = vec![0u64; config.threads_count];
        let mut result = HarnessResult::new(self.seed);

        while let Some(thread) = next_runnable(&mut env, &steps, config.operations_per_thread) {
            let op = if thread % 2 == 0 {
                DstOp::Push(item_tag(thread, steps[thread] + 1))
            } else if env.rng().gen_bool(config.clear_probability) {
                DstOp::Clear
            } else {
                DstOp::Pop
            };
            steps[thread] += 1;

            runner.set_thread(thread as u64);
            // A crashed operation is part of the run.
            let _ = runner.apply(op);
            result.operations_count += 1;

            let interval = config.invariant_check_interval;
            if interval > 0
                && result.operations_count % interval == 0
                && !result.check(first_violation(&runner.check_invariants()))
            {
                break;
            }

            env.maybe_delay();
            if let Some(ScheduleDecision::SwitchTo(_)) = env.scheduler().map(|s| s.decide()) {
                result.context_switches_count += 1;
            }
        }

        if result.passed() {
            result.check(first_violation(&runner.check_invariants()));
        }

        let stats = runner.stats();
        result.faults_injected_count = stats.faults_injected;
        tracing::info!(
            seed = self.seed,
            ops = result.operations_count,
            switches = result.context_switches_count,
            rejected = stats.rejected_pushes,
            passed = result.passed(),
            "simulated queue run finished"
        );
        result
    }

    /// Real-thread run through the queue's blocking and timed pops.
    ///
    /// Producers retry rejected pushes until accepted. Consumers pick a
    /// blocking or a timed pop per step. Once every producer is done, one
    /// stop tag per consumer is pushed; FIFO order puts the stop tags behind
    /// every real item, so consumers exit only after the queue is drained.
    /// Delay faults sleep for real and preemptions yield. Crashes stay in
    /// [`run_queue`](Self::run_queue).
    ///
    /// Checks afterwards: no item lost, invented or duplicated, the bound
    /// held whenever a consumer looked, and each consumer saw every
    /// producer's items in push order.
    pub fn run_threaded<Q: DstTestableQueue>(&self, capacity: usize) -> HarnessResult {
        let queue = Q::with_capacity(capacity);
        let producers = (self.config.threads_count + 1) / 2;
        let consumers = (self.config.threads_count / 2).max(1);
        let items = self.config.operations_per_thread;

        let (producer_reports, consumer_reports) = thread::scope(|scope| {
            let consumer_handles: Vec<_> = (0..consumers)
                .map(|c| {
                    let worker = Worker::new(self.seed, 2 * c + 1, &self.config);
                    let queue = &queue;
                    scope.spawn(move || worker.consume(queue))
                })
                .collect();
            let producer_handles: Vec<_> = (0..producers)
                .map(|p| {
                    let worker = Worker::new(self.seed, 2 * p, &self.config);
                    let queue = &queue;
                    scope.spawn(move || worker.produce(queue, items))
                })
                .collect();

            let producer_reports: Vec<WorkerReport> =
                producer_handles.into_iter().map(join_worker).collect();
            for _ in 0..consumers {
                while !queue.push(STOP_TAG) {
                    thread::yield_now();
                }
            }
            let consumer_reports: Vec<WorkerReport> =
                consumer_handles.into_iter().map(join_worker).collect();
            (producer_reports, consumer_reports)
        });

        let mut result = HarnessResult::new(self.seed);
        for report in producer_reports.iter().chain(&consumer_reports) {
            result.operations_count += report.operations_count;
            result.faults_injected_count += report.faults_count;
            result.timeouts_count += report.timeouts_count;
            if let Some(violation) = &report.violation {
                result.check(Err(violation.clone()));
            }
        }

        let outcome = ThreadedOutcome {
            produced: producer_reports.iter().flat_map(|r| r.items.iter().copied()).collect(),
            consumed: consumer_reports.iter().flat_map(|r| r.items.iter().copied()).collect(),
            contents: queue.get_contents(),
            capacity: queue.capacity() as u64,
        };
        let checker = QueuePropertyChecker::new(&outcome).with_seed(self.seed);
        for property in [
            checker.check_no_lost_items(),
            checker.check_no_phantom_items(),
            checker.check_no_duplicates(),
            checker.check_bounded_capacity(),
        ] {
            result.check(first_violation(&[property]));
        }
        let logs: Vec<&[u64]> = consumer_reports.iter().map(|r| r.items.as_slice()).collect();
        result.check(check_producer_order(&logs));

        tracing::info!(
            seed = self.seed,
            ops = result.operations_count,
            timeouts = result.timeouts_count,
            passed = result.passed(),
            "threaded queue run finished"
        );
        result
    }
}

fn item_tag(thread: usize, n: u64) -> u64 {
    ((thread as u64) << 32) | n
}

/// The current thread if it has work left, else another one that does.
fn next_runnable(env: &mut DstEnv, steps: &[u64], limit: u64) -> Option<usize> {
    if steps.iter().all(|&s| s >= limit) {
        return None;
    }
    let scheduler = env.scheduler()?;
    while steps[scheduler.current_thread()] >= limit {
        scheduler.force_switch();
    }
    Some(scheduler.current_thread())
}

fn first_violation(results: &[PropertyResult]) -> Result<(), String> {
    match results.iter().find(|r| !r.holds) {
        Some(failed) => Err(failed.to_string()),
        None => Ok(()),
    }
}

/// Items from one producer must reach any single consumer in push order.
fn check_producer_order(consumer_logs: &[&[u64]]) -> Result<(), String> {
    for (consumer, log) in consumer_logs.iter().enumerate() {
        let mut last_seen: Vec<(u64, u64)> = Vec::new();
        for &tag in *log {
            let (producer, n) = (tag >> 32, tag & u64::from(u32::MAX));
            match last_seen.iter_mut().find(|(p, _)| *p == producer) {
                Some((_, last)) if *last >= n => {
                    return Err(format!(
                        "consumer {} popped item {} of producer {} after item {}",
                        consumer, n, producer, last
                    ));
                }
                Some((_, last)) => *last = n,
                None => last_seen.push((producer, n)),
            }
        }
    }
    Ok(())
}

fn join_worker(handle: thread::ScopedJoinHandle<'_, WorkerReport>) -> WorkerReport {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

/// What a real thread did.
#[derive(Debug, Default)]
struct WorkerReport {
    /// Pushed items for a producer, popped items for a consumer
    items: Vec<u64>,
    operations_count: u64,
    faults_count: u64,
    timeouts_count: u64,
    violation: Option<String>,
}

/// One real producer or consumer with its own seeded choices.
struct Worker {
    thread_id: usize,
    rng: DeterministicRng,
    fault: FaultInjector,
    blocking_pop_probability: f64,
    pop_timeout_ms_max: u64,
    report: WorkerReport,
}

impl Worker {
    fn new(seed: u64, thread_id: usize, config: &HarnessConfig) -> Self {
        let stream = seed.wrapping_add(16 * (thread_id as u64 + 1));
        Self {
            thread_id,
            rng: DeterministicRng::new(stream),
            fault: FaultInjector::new(
                DeterministicRng::new(stream.wrapping_add(1)),
                config.fault_config.clone(),
            ),
            blocking_pop_probability: config.blocking_pop_probability,
            pop_timeout_ms_max: config.pop_timeout_ms_max,
            report: WorkerReport::default(),
        }
    }

    fn maybe_fault(&mut self) {
        if !self.fault.should_fail() {
            return;
        }
        self.report.faults_count += 1;
        let fault = if self.rng.gen_bool(0.5) {
            FaultType::Delay
        } else {
            FaultType::Preemption
        };
        tracing::trace!(thread = self.thread_id, ?fault, "fault injected");
        match fault {
            FaultType::Delay => thread::sleep(Duration::from_micros(self.rng.gen_range(1..=500))),
            _ => thread::yield_now(),
        }
    }

    fn produce<Q: DstTestableQueue>(mut self, queue: &Q, items: u64) -> WorkerReport {
        for n in 1..=items {
            let tag = item_tag(self.thread_id, n);
            self.maybe_fault();
            while !queue.push(tag) {
                self.report.operations_count += 1;
                thread::yield_now();
            }
            self.report.operations_count += 1;
            self.report.items.push(tag);
        }
        self.report
    }

    fn consume<Q: DstTestableQueue>(mut self, queue: &Q) -> WorkerReport {
        loop {
            self.maybe_fault();
            let item = if self.rng.gen_bool(self.blocking_pop_probability) {
                queue.pop()
            } else {
                let timeout = Duration::from_millis(self.rng.gen_range(0..=self.pop_timeout_ms_max));
                let item = queue.pop_timeout(timeout);
                if item.is_none() {
                    self.report.timeouts_count += 1;
                }
                item
            };
            self.report.operations_count += 1;

            let len = queue.len();
            if len > queue.capacity() && self.report.violation.is_none() {
                self.report.violation = Some(format!(
                    "consumer {} saw {} items in a queue of capacity {}",
                    self.thread_id,
                    len,
                    queue.capacity()
                ));
            }

            match item {
                Some(STOP_TAG) => return self.report,
                Some(item) => self.report.items.push(item),
                None => {}
            }
        }
    }
}

/// End state of a threaded run, for the set-based invariants.
struct ThreadedOutcome {
    produced: Vec<u64>,
    consumed: Vec<u64>,
    contents: Vec<u64>,
    capacity: u64,
}

impl QueueProperties for ThreadedOutcome {
    fn produced_items(&self) -> Vec<u64> {
        self.produced.clone()
    }

    fn consumed_items(&self) -> Vec<u64> {
        self.consumed.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.contents.clone()
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    // Real threads give no linearization order; per-producer order is
    // checked from the consumer logs instead.
    fn history(&self) -> QueueHistory {
        QueueHistory::new()
    }
}
