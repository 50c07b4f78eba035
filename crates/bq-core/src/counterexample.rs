//! Failure traces for queue invariants.
//!
//! A counterexample lists the recorded queue operations that led to a
//! violation, each with the queue length the history implies afterwards.
//! Set-based invariants have no useful trace and carry the observed final
//! state instead.

use std::fmt;

/// One recorded operation in a failure trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub step: u64,
    pub thread_id: u64,
    /// `push(3)`, `push(3) rejected`, `pop -> 3`, `pop -> empty` or `clear`
    pub action: String,
    /// Queue length implied by the history after this step
    pub model_len: usize,
}

/// Why an invariant failed and how to get there again.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// DST seed that reproduces the run, when there is one
    pub seed: Option<u64>,
    pub description: Option<String>,
    pub trace: Vec<TraceStep>,
    /// Named pieces of final state, e.g. `contents = [1, 2]`
    pub observed: Vec<(String, String)>,
}

impl Counterexample {
    pub fn new(seed: Option<u64>) -> Self {
        debug_assert!(seed != Some(0), "DST seed should not be zero");
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a trace step. Steps must be strictly increasing.
    pub fn push_step(&mut self, step: TraceStep) {
        debug_assert!(
            self.trace.last().map_or(true, |last| step.step > last.step),
            "Trace steps must be increasing"
        );
        self.trace.push(step);
    }

    /// Record a piece of final state.
    pub fn observe(&mut self, name: &str, value: impl fmt::Debug) {
        self.observed.push((name.to_string(), format!("{:?}", value)));
    }
}

/// ```text
/// DST_SEED=42
/// Failure: pop returned 2 but model expected 1 (step 3)
///  step | thread | len | action
///     1 |      0 |   1 | push(1)
///     2 |      0 |   2 | push(2)
///     3 |      1 |   1 | pop -> 2
/// ```
impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(seed) = self.seed {
            writeln!(f, "DST_SEED={}", seed)?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "Failure: {}", description)?;
        }
        if !self.trace.is_empty() {
            writeln!(f, " step | thread | len | action")?;
            for step in &self.trace {
                writeln!(
                    f,
                    "{:5} | {:6} | {:3} | {}",
                    step.step, step.thread_id, step.model_len, step.action
                )?;
            }
        }
        for (name, value) in &self.observed {
            writeln!(f, "  {} = {}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_rendering() {
        let mut ce = Counterexample::new(Some(42)).with_description("pop out of order");
        ce.push_step(TraceStep {
            step: 1,
            thread_id: 0,
            action: "push(1)".to_string(),
            model_len: 1,
        });
        ce.push_step(TraceStep {
            step: 2,
            thread_id: 1,
            action: "pop -> 1".to_string(),
            model_len: 0,
        });

        let rendered = ce.to_string();
        assert!(rendered.starts_with("DST_SEED=42\nFailure: pop out of order\n"));
        assert!(rendered.contains("    1 |      0 |   1 | push(1)"));
        assert!(rendered.contains("    2 |      1 |   0 | pop -> 1"));
    }

    #[test]
    fn test_observed_state_without_trace() {
        let mut ce = Counterexample::new(None).with_description("item 5 lost");
        ce.observe("contents", Vec::<u64>::new());

        let rendered = ce.to_string();
        assert_eq!(rendered, "Failure: item 5 lost\n  contents = []\n");
    }
}
