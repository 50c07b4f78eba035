//! Mutual exclusion lock.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::TryLockError;

use crate::error::SyncError;
use crate::{Mutex, MutexGuard};

const PRIMITIVE: &str = "locker";

/// A mutex owning the state it protects.
///
/// Acquiring returns a `LockerGuard`; dropping the guard releases the lock.
pub struct Locker<T> {
    inner: Mutex<T>,
}

/// Proof that the lock is held. Pass it to `Cond::wait` to wait with it.
pub struct LockerGuard<'a, T> {
    pub(crate) guard: MutexGuard<'a, T>,
}

impl<T> Locker<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, blocking until it is available.
    pub fn lock(&self) -> Result<LockerGuard<'_, T>, SyncError> {
        self.inner
            .lock()
            .map(|guard| LockerGuard { guard })
            .map_err(|_| SyncError::poisoned(PRIMITIVE))
    }

    /// Acquire the lock if nobody holds it. `Ok(None)` when it is busy.
    pub fn try_lock(&self) -> Result<Option<LockerGuard<'_, T>>, SyncError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(Some(LockerGuard { guard })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(_)) => Err(SyncError::poisoned(PRIMITIVE)),
        }
    }

    /// Consume the lock and return the protected value.
    pub fn into_inner(self) -> Result<T, SyncError> {
        self.inner
            .into_inner()
            .map_err(|_| SyncError::poisoned(PRIMITIVE))
    }
}

impl<T: Default> Default for Locker<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Locker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker").finish_non_exhaustive()
    }
}

impl<T> Deref for LockerGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LockerGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_and_mutate() {
        let locker = Locker::new(1u32);
        {
            let mut guard = locker.lock().unwrap();
            *guard += 41;
        }
        assert_eq!(*locker.lock().unwrap(), 42);
        assert_eq!(locker.into_inner().unwrap(), 42);
    }

    #[test]
    fn test_try_lock_busy() {
        let locker = Locker::new(());
        let held = locker.lock().unwrap();
        assert!(locker.try_lock().unwrap().is_none());
        drop(held);
        assert!(locker.try_lock().unwrap().is_some());
    }

    #[test]
    fn test_poisoned_lock_reports_error() {
        let locker = Arc::new(Locker::new(0u32));
        let poisoner = Arc::clone(&locker);

        let result = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(result.is_err());

        match locker.lock() {
            Err(err) => assert_eq!(err, SyncError::Poisoned { primitive: "locker" }),
            Ok(_) => panic!("lock should be poisoned"),
        }
        assert!(matches!(locker.try_lock(), Err(SyncError::Poisoned { .. })));
    }

    #[test]
    fn test_mutual_exclusion() {
        let locker = Arc::new(Locker::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locker = Arc::clone(&locker);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *locker.lock().unwrap() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*locker.lock().unwrap(), 4000);
    }
}
