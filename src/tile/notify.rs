//! Broadcast completion notification.
//!
//! One [`Notification`] is shared between the tile cache (which signals it on
//! every completed load and on clear) and any number of consumers. Consumers
//! never assume one wake per completion: every wait re-checks a predicate.
//!
//! Blocking threads wait on a condition variable guarded by a generation
//! counter; async tasks wait on a [`tokio::sync::Notify`]. Both are woken by
//! the same [`Notification::notify_all`] call.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

/// Broadcast wake primitive shared by the cache and its consumers.
pub struct Notification {
    generation: Mutex<u64>,
    condvar: Condvar,
    notify: Notify,
}

impl Notification {
    pub fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            condvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Wake every waiting thread and task.
    pub fn notify_all(&self) {
        {
            let mut generation = self.generation.lock();
            *generation = generation.wrapping_add(1);
        }
        self.condvar.notify_all();
        self.notify.notify_waiters();
    }

    /// Number of broadcasts so far (wrapping).
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Block until `check` yields a value or `timeout` elapses.
    ///
    /// `check` runs once up front and again after every wake. It runs while
    /// the notification's internal lock is held, so a broadcast cannot slip
    /// in between a failed check and the wait. `check` must not call back
    /// into this notification.
    ///
    /// A timeout too large to represent as a deadline (such as
    /// `Duration::MAX`) waits indefinitely.
    pub fn wait_until<T>(&self, timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut generation = self.generation.lock();
        loop {
            if let Some(value) = check() {
                return Some(value);
            }
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut generation, deadline).timed_out() {
                        return check();
                    }
                }
                None => self.condvar.wait(&mut generation),
            }
        }
    }

    /// Async counterpart of [`wait_until`](Self::wait_until) without a
    /// deadline; wrap it in `tokio::time::timeout` to bound it.
    pub async fn wait_until_async<T>(&self, mut check: impl FnMut() -> Option<T>) -> T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a broadcast between the check and
            // the await is not lost.
            notified.as_mut().enable();

            if let Some(value) = check() {
                return value;
            }
            notified.await;
        }
    }
}

impl Default for Notification {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("generation", &self.generation())
            .finish()
    }
}
