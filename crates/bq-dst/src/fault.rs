//! Probabilistic fault decisions driven by a seeded RNG.

use crate::random::DeterministicRng;

/// Fault injection probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultConfig {
    /// Probability that an operation boundary injects a fault
    pub failure_probability: f64,
    /// Probability that `maybe_delay` delays
    pub delay_probability: f64,
    /// Upper bound of a simulated delay, in microseconds
    pub delay_us_max: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.05,
            delay_probability: 0.1,
            delay_us_max: 1_000,
        }
    }
}

impl FaultConfig {
    /// No faults, no delays.
    pub fn none() -> Self {
        Self {
            failure_probability: 0.0,
            delay_probability: 0.0,
            delay_us_max: 0,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            failure_probability: 0.25,
            delay_probability: 0.4,
            delay_us_max: 10_000,
        }
    }
}

/// Counters kept by a `FaultInjector`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub checks_count: u64,
    pub faults_count: u64,
    pub delays_count: u64,
}

/// Decides, reproducibly, when to fail and when to delay.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&config.failure_probability),
            "failure_probability out of range"
        );
        debug_assert!(
            (0.0..=1.0).contains(&config.delay_probability),
            "delay_probability out of range"
        );
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    pub fn should_fail(&mut self) -> bool {
        self.stats.checks_count += 1;
        let fail = self.rng.gen_bool(self.config.failure_probability);
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// Delay length in microseconds, when a delay is due.
    pub fn maybe_delay_us(&mut self) -> Option<u64> {
        if self.config.delay_us_max == 0 || !self.rng.gen_bool(self.config.delay_probability) {
            return None;
        }
        self.stats.delays_count += 1;
        Some(self.rng.gen_range(1..=self.config.delay_us_max))
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}
