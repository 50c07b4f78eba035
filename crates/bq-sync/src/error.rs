use thiserror::Error;

/// Failure reported by a synchronization primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A thread panicked while holding the lock.
    #[error("{primitive} poisoned: a thread panicked while holding the lock")]
    Poisoned { primitive: &'static str },

    /// A counter would exceed its maximum value.
    #[error("{primitive} counter overflow")]
    Overflow { primitive: &'static str },
}

impl SyncError {
    pub(crate) fn poisoned(primitive: &'static str) -> Self {
        tracing::warn!(primitive, "synchronization primitive poisoned");
        Self::Poisoned { primitive }
    }

    pub(crate) fn overflow(primitive: &'static str) -> Self {
        tracing::warn!(primitive, "synchronization counter overflow");
        Self::Overflow { primitive }
    }

    /// Name of the primitive that failed.
    pub fn primitive(&self) -> &'static str {
        match self {
            Self::Poisoned { primitive } | Self::Overflow { primitive } => primitive,
        }
    }
}
