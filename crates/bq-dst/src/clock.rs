//! Simulated time. Only moves when told to.

/// Deterministic clock in nanoseconds since the start of the simulation.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ns: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    pub fn now_us(&self) -> u64 {
        self.now_ns / 1_000
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ns / 1_000_000
    }

    pub fn advance_ns(&mut self, ns: u64) {
        self.now_ns = self.now_ns.saturating_add(ns);
    }

    pub fn advance_us(&mut self, us: u64) {
        self.advance_ns(us.saturating_mul(1_000));
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.advance_ns(ms.saturating_mul(1_000_000));
    }

    /// Whether simulated time has reached `deadline_ns`.
    pub fn has_passed(&self, deadline_ns: u64) -> bool {
        self.now_ns >= deadline_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance() {
        let mut clock = SimClock::new();
        clock.advance_ms(2);
        clock.advance_us(500);
        clock.advance_ns(7);
        assert_eq!(clock.now_ns(), 2_500_007);
        assert_eq!(clock.now_us(), 2_500);
        assert_eq!(clock.now_ms(), 2);
        assert!(clock.has_passed(2_500_000));
        assert!(!clock.has_passed(3_000_000));
    }
}
