//! Queue and configuration errors.

use std::error::Error as StdError;
use std::fmt;

use bq_sync::SyncError;
use thiserror::Error;

/// Why a queue operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Push rejected: the queue holds `capacity` items.
    #[error("queue is full")]
    Full,

    /// Peek or non-blocking pop on an empty queue.
    #[error("queue is empty")]
    Empty,

    /// Timed pop found nothing before its deadline.
    #[error("timed out waiting for an item")]
    Timeout,

    /// The lock or condition variable failed.
    #[error("wait failed: {0}")]
    Wait(#[from] SyncError),
}

/// A rejected push. Hands the item back to the caller.
pub struct PushError<T> {
    pub item: T,
    pub kind: QueueError,
}

impl<T> PushError<T> {
    pub(crate) fn new(item: T, kind: QueueError) -> Self {
        Self { item, kind }
    }

    /// Recover the item that was not enqueued.
    pub fn into_inner(self) -> T {
        self.item
    }

    /// Why the push failed: `Full`, or `Wait` for a poisoned lock.
    pub fn kind(&self) -> QueueError {
        self.kind
    }

    pub fn is_full(&self) -> bool {
        self.kind == QueueError::Full
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "push rejected: {}", self.kind)
    }
}

impl<T> StdError for PushError<T> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.kind)
    }
}

impl<T> From<PushError<T>> for QueueError {
    fn from(err: PushError<T>) -> Self {
        err.kind
    }
}

/// Invalid or unreadable queue configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("capacity must be positive")]
    ZeroCapacity,

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_error_returns_item() {
        let err = PushError::new(String::from("record"), QueueError::Full);
        assert!(err.is_full());
        assert_eq!(err.to_string(), "push rejected: queue is full");
        assert!(err.source().is_some());
        assert_eq!(err.into_inner(), "record");
    }

    #[test]
    fn test_push_error_debug_hides_item() {
        struct Opaque;
        let err = PushError::new(Opaque, QueueError::Full);
        assert!(format!("{:?}", err).contains("Full"));
        assert_eq!(QueueError::from(err), QueueError::Full);
    }

    #[test]
    fn test_wait_wraps_sync_error() {
        let err: QueueError = SyncError::Poisoned { primitive: "locker" }.into();
        assert!(matches!(err, QueueError::Wait(_)));
        assert!(err.to_string().contains("locker poisoned"));
    }
}
