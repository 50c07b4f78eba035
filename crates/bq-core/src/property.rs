//! Property results and the checker trait.
//!
//! A checker evaluates every invariant of a structure against a snapshot
//! of its observable state and reports one `PropertyResult` per invariant.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking a single invariant.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Invariant name (e.g., "NoLostItems")
    pub name: String,
    /// Whether the invariant holds
    pub holds: bool,
    /// Human-readable description of the violation
    pub violation: Option<String>,
    /// Failure path, when the checker could build one
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A passing result.
    pub fn pass(name: &str) -> Self {
        debug_assert!(!name.is_empty(), "Property name must not be empty");
        Self {
            name: name.to_string(),
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    /// A failing result with a violation message.
    pub fn fail(name: &str, violation: String, counterexample: Option<Counterexample>) -> Self {
        debug_assert!(!name.is_empty(), "Property name must not be empty");
        Self {
            name: name.to_string(),
            holds: false,
            violation: Some(violation),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.violation {
            None => write!(f, "[PASS] {}", self.name),
            Some(v) => {
                write!(f, "[FAIL] {}: {}", self.name, v)?;
                if let Some(ce) = &self.counterexample {
                    write!(f, "\n{}", ce)?;
                }
                Ok(())
            }
        }
    }
}

/// Evaluates a set of invariants.
pub trait PropertyChecker {
    /// Check every invariant, in a fixed order.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every invariant holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the failing results.
    fn violations(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }

    /// One line per invariant, failures expanded with their counterexample.
    fn report(&self) -> String {
        self.check_all()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
