//! Deterministic thread scheduler for simulated interleavings.

use crate::random::DeterministicRng;

/// What the scheduler decided at a yield point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Keep running the current thread
    Continue,
    /// Switch to the given thread
    SwitchTo(usize),
}

/// Picks which simulated thread runs next.
#[derive(Debug, Clone)]
pub struct Scheduler {
    rng: DeterministicRng,
    threads_count: usize,
    yield_probability: f64,
    current: usize,
}

impl Scheduler {
    pub fn new(rng: DeterministicRng, threads_count: usize, yield_probability: f64) -> Self {
        debug_assert!(threads_count > 0, "Must have at least one thread");
        Self {
            rng,
            threads_count,
            yield_probability,
            current: 0,
        }
    }

    pub fn current_thread(&self) -> usize {
        self.current
    }

    pub fn threads_count(&self) -> usize {
        self.threads_count
    }

    /// Decide at a yield point.
    pub fn decide(&mut self) -> ScheduleDecision {
        if self.threads_count < 2 || !self.rng.gen_bool(self.yield_probability) {
            return ScheduleDecision::Continue;
        }
        let next = self.pick_other();
        self.current = next;
        ScheduleDecision::SwitchTo(next)
    }

    /// Switch away from the current thread unconditionally.
    pub fn force_switch(&mut self) -> usize {
        if self.threads_count > 1 {
            self.current = self.pick_other();
        }
        self.current
    }

    fn pick_other(&mut self) -> usize {
        let offset = self.rng.gen_range(1..self.threads_count);
        (self.current + offset) % self.threads_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_thread_never_switches() {
        let mut scheduler = Scheduler::new(DeterministicRng::new(1), 1, 1.0);
        for _ in 0..100 {
            assert_eq!(scheduler.decide(), ScheduleDecision::Continue);
        }
        assert_eq!(scheduler.force_switch(), 0);
    }

    #[test]
    fn test_switch_targets_other_thread() {
        let mut scheduler = Scheduler::new(DeterministicRng::new(1), 3, 1.0);
        for _ in 0..100 {
            let before = scheduler.current_thread();
            match scheduler.decide() {
                ScheduleDecision::SwitchTo(next) => {
                    assert_ne!(next, before);
                    assert!(next < 3);
                }
                ScheduleDecision::Continue => panic!("yield_probability 1.0 must switch"),
            }
        }
    }
}
