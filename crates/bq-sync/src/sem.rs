//! Counting semaphore.

use std::fmt;
use std::time::{Duration, Instant};

use crate::cond::Cond;
use crate::error::SyncError;
use crate::locker::Locker;

const PRIMITIVE: &str = "sem";

/// A counting semaphore built from a `Locker` and a `Cond`.
///
/// `wait` decrements, blocking while the count is zero. `post` increments
/// and wakes one waiter.
pub struct Sem {
    count: Locker<usize>,
    available: Cond,
}

impl Sem {
    #[must_use]
    pub fn new(initial: usize) -> Self {
        Self {
            count: Locker::new(initial),
            available: Cond::new(),
        }
    }

    /// Decrement, blocking while the count is zero.
    pub fn wait(&self) -> Result<(), SyncError> {
        let mut count = self.count.lock()?;
        while *count == 0 {
            count = self.available.wait(count)?;
        }
        *count -= 1;
        Ok(())
    }

    /// Decrement if positive. Returns whether it did.
    pub fn try_wait(&self) -> Result<bool, SyncError> {
        let mut count = self.count.lock()?;
        if *count == 0 {
            return Ok(false);
        }
        *count -= 1;
        Ok(true)
    }

    /// Decrement, waiting at most `timeout`. Returns whether it did.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, SyncError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait().map(|()| true);
        };
        let mut count = self.count.lock()?;
        while *count == 0 {
            let (guard, status) = self.available.wait_until(count, deadline)?;
            count = guard;
            if status.timed_out() && *count == 0 {
                return Ok(false);
            }
        }
        *count -= 1;
        Ok(true)
    }

    /// Increment and wake one waiter.
    pub fn post(&self) -> Result<(), SyncError> {
        let mut count = self.count.lock()?;
        *count = count
            .checked_add(1)
            .ok_or_else(|| SyncError::overflow(PRIMITIVE))?;
        drop(count);
        self.available.notify_one();
        Ok(())
    }

    /// Current count. A snapshot; it may change as soon as it is returned.
    pub fn available(&self) -> Result<usize, SyncError> {
        Ok(*self.count.lock()?)
    }
}

impl Default for Sem {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for Sem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sem").finish_non_exhaustive()
    }
}


#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn test_post_releases_waiter() {
        loom::model(|| {
            let sem = Arc::new(Sem::new(0));
            let poster = Arc::clone(&sem);

            let h = thread::spawn(move || {
                poster.post().unwrap();
            });

            sem.wait().unwrap();
            h.join().unwrap();
            assert_eq!(sem.available().unwrap(), 0);
        });
    }

    #[test]
    fn test_single_permit_one_winner() {
        loom::model(|| {
            let sem = Arc::new(Sem::new(1));
            let s1 = Arc::clone(&sem);
            let s2 = Arc::clone(&sem);

            let h1 = thread::spawn(move || s1.try_wait().unwrap());
            let h2 = thread::spawn(move || s2.try_wait().unwrap());

            let won = [h1.join().unwrap(), h2.join().unwrap()];
            assert_eq!(won.iter().filter(|w| **w).count(), 1);
        });
    }
}
