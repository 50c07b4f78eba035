//! Queue configuration.
//!
//! Defaults, then a TOML file, then `BLOCKQ_*` environment variables.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default capacity when none is configured.
pub const CAPACITY_DEFAULT: usize = 1000;

pub const ENV_CAPACITY: &str = "BLOCKQ_CAPACITY";
pub const ENV_TIMED_POP: &str = "BLOCKQ_TIMED_POP";

/// How many times a timed pop waits before giving up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimedPopPolicy {
    /// Wait once; a spurious wake or a lost race ends the pop with `Timeout`.
    #[serde(alias = "single")]
    SingleAttempt,
    /// Keep waiting until an item arrives or the deadline passes.
    #[default]
    Deadline,
}

impl FromStr for TimedPopPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "single_attempt" => Ok(Self::SingleAttempt),
            "deadline" => Ok(Self::Deadline),
            _ => Err(()),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued items
    pub capacity: usize,
    pub timed_pop: TimedPopPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: CAPACITY_DEFAULT,
            timed_pop: TimedPopPolicy::Deadline,
        }
    }
}

impl QueueConfig {
    /// Single-attempt timed pops.
    pub fn legacy() -> Self {
        Self {
            timed_pop: TimedPopPolicy::SingleAttempt,
            ..Self::default()
        }
    }

    /// Capacity 16, for tests and demos.
    pub fn small() -> Self {
        Self {
            capacity: 16,
            ..Self::default()
        }
    }

    /// Reject a zero capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Parse TOML; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Defaults overridden by `BLOCKQ_CAPACITY` and `BLOCKQ_TIMED_POP`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CAPACITY) {
            self.capacity = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_CAPACITY,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_TIMED_POP) {
            self.timed_pop = value.parse().map_err(|()| ConfigError::Env {
                var: ENV_TIMED_POP,
                value: value.clone(),
            })?;
        }
        self.validate()?;
        Ok(self)
    }
}
