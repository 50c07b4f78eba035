//! Simulation environment bundling time, randomness, faults and scheduling.

use std::fmt;

use crate::clock::SimClock;
use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;
use crate::scheduler::Scheduler;

/// Everything a deterministic test draws from, derived from one seed.
///
/// Each component gets its own RNG stream so adding draws in one place
/// does not shift the others.
#[derive(Debug)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    clock: SimClock,
    fault: FaultInjector,
    scheduler: Option<Scheduler>,
    delays_us_total: u64,
}

/// Summary of an environment's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvStats {
    pub seed: u64,
    pub elapsed_us: u64,
    pub delays_count: u64,
    pub delays_us_total: u64,
    pub faults_count: u64,
}

impl fmt::Display for EnvStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DST_SEED={} elapsed_us={} delays={} delay_us={} faults={}",
            self.seed, self.elapsed_us, self.delays_count, self.delays_us_total, self.faults_count
        )
    }
}

impl DstEnv {
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    pub fn with_fault_config(seed: u64, config: FaultConfig) -> Self {
        Self {
            seed,
            rng: DeterministicRng::new(seed),
            clock: SimClock::new(),
            fault: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), config),
            scheduler: None,
            delays_us_total: 0,
        }
    }

    /// Environment with a scheduler for `threads_count` simulated threads.
    pub fn with_scheduler(seed: u64, threads_count: usize) -> Self {
        Self::with_scheduler_config(seed, threads_count, 0.2, FaultConfig::default())
    }

    pub fn with_scheduler_config(
        seed: u64,
        threads_count: usize,
        yield_probability: f64,
        config: FaultConfig,
    ) -> Self {
        let mut env = Self::with_fault_config(seed, config);
        env.scheduler = Some(Scheduler::new(
            DeterministicRng::new(seed.wrapping_add(2)),
            threads_count,
            yield_probability,
        ));
        env
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn clock(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    pub fn scheduler(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    /// Advance simulated time by a random delay if the fault config says so.
    ///
    /// Returns the delay applied in microseconds.
    pub fn maybe_delay(&mut self) -> Option<u64> {
        let us = self.fault.maybe_delay_us()?;
        self.clock.advance_us(us);
        self.delays_us_total += us;
        tracing::trace!(seed = self.seed, delay_us = us, "simulated delay");
        Some(us)
    }

    /// `DST_SEED=<seed>`, for assertion messages.
    #[must_use]
    pub fn format_seed(&self) -> String {
        format!("DST_SEED={}", self.seed)
    }

    pub fn stats(&self) -> EnvStats {
        let fault = self.fault.stats();
        EnvStats {
            seed: self.seed,
            elapsed_us: self.clock.now_us(),
            delays_count: fault.delays_count,
            delays_us_total: self.delays_us_total,
            faults_count: fault.faults_count,
        }
    }
}
