//! Condition variable.

use std::fmt;
use std::time::Instant;

use crate::error::SyncError;
use crate::locker::LockerGuard;
use crate::Condvar;

const PRIMITIVE: &str = "cond";

/// How a deadline wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Woken by a notification (or spuriously) before the deadline.
    Notified,
    /// The deadline passed.
    TimedOut,
}

impl WaitStatus {
    #[must_use]
    pub fn timed_out(self) -> bool {
        self == Self::TimedOut
    }
}

/// A condition variable used with the guard of a `Locker`.
///
/// Waiting atomically releases the lock and re-acquires it before
/// returning. Wakeups may be spurious; callers re-check their condition.
pub struct Cond {
    inner: Condvar,
}

impl Cond {
    pub fn new() -> Self {
        Self {
            inner: Condvar::new(),
        }
    }

    /// Block until notified.
    pub fn wait<'a, T>(&self, guard: LockerGuard<'a, T>) -> Result<LockerGuard<'a, T>, SyncError> {
        self.inner
            .wait(guard.guard)
            .map(|guard| LockerGuard { guard })
            .map_err(|_| SyncError::poisoned(PRIMITIVE))
    }

    /// Block until notified or until `deadline` passes.
    ///
    /// A deadline already in the past times out without releasing the lock.
    pub fn wait_until<'a, T>(
        &self,
        guard: LockerGuard<'a, T>,
        deadline: Instant,
    ) -> Result<(LockerGuard<'a, T>, WaitStatus), SyncError> {
        let now = Instant::now();
        if now >= deadline {
            return Ok((guard, WaitStatus::TimedOut));
        }

        let (guard, result) = self
            .inner
            .wait_timeout(guard.guard, deadline - now)
            .map_err(|_| SyncError::poisoned(PRIMITIVE))?;

        let status = if result.timed_out() {
            WaitStatus::TimedOut
        } else {
            WaitStatus::Notified
        };
        Ok((LockerGuard { guard }, status))
    }

    /// Wake one waiter.
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wake every waiter.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

impl Default for Cond {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cond").finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::Locker;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_until_times_out() {
        let locker = Locker::new(false);
        let cond = Cond::new();

        let start = Instant::now();
        let guard = locker.lock().unwrap();
        let (guard, status) = cond
            .wait_until(guard, start + Duration::from_millis(30))
            .unwrap();

        assert!(status.timed_out());
        assert!(!*guard);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_past_deadline_returns_immediately() {
        let locker = Locker::new(());
        let cond = Cond::new();
        let guard = locker.lock().unwrap();
        let deadline = Instant::now();
        thread::sleep(Duration::from_millis(1));

        let (_guard, status) = cond.wait_until(guard, deadline).unwrap();
        assert_eq!(status, WaitStatus::TimedOut);
    }

    #[test]
    fn test_notify_all_wakes_every_waiter() {
        let state = Arc::new((Locker::new(false), Cond::new()));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    let (locker, cond) = &*state;
                    let mut ready = locker.lock().unwrap();
                    while !*ready {
                        ready = cond.wait(ready).unwrap();
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        {
            let (locker, cond) = &*state;
            *locker.lock().unwrap() = true;
            cond.notify_all();
        }

        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    #[test]
    fn test_notify_one_before_deadline() {
        let state = Arc::new((Locker::new(0u32), Cond::new()));
        let notifier = Arc::clone(&state);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let (locker, cond) = &*notifier;
            *locker.lock().unwrap() = 7;
            cond.notify_one();
        });

        let (locker, cond) = &*state;
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut value = locker.lock().unwrap();
        while *value == 0 {
            let (guard, status) = cond.wait_until(value, deadline).unwrap();
            value = guard;
            assert!(!status.timed_out(), "notification should arrive well before the deadline");
        }
        assert_eq!(*value, 7);
        drop(value);

        handle.join().unwrap();
    }
}
