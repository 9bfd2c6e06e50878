//! Waitable events for handing signals between threads.
//!
//! These are the blocking latches used when one thread has to wait for
//! another to reach a point, such as a loop thread reporting its task
//! runner, or a test waiting for work posted to another loop.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// An event that wakes exactly one waiter per signal and then resets.
///
/// Signals are not counted: signalling an already signalled event is a
/// no-op.
#[derive(Debug, Default)]
pub struct AutoResetEvent {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl AutoResetEvent {
    /// Creates a non-signalled event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the event, waking one waiter.
    pub fn signal(&self) {
        *lock(&self.signalled) = true;
        self.condvar.notify_one();
    }

    /// Clears a pending signal.
    pub fn reset(&self) {
        *lock(&self.signalled) = false;
    }

    /// Returns `true` if a signal is pending.
    pub fn is_signalled(&self) -> bool {
        *lock(&self.signalled)
    }

    /// Blocks until the event is signalled, then resets it.
    pub fn wait(&self) {
        let mut signalled = lock(&self.signalled);
        while !*signalled {
            signalled = self
                .condvar
                .wait(signalled)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *signalled = false;
    }

    /// Blocks until the event is signalled or `timeout` elapses.
    ///
    /// Returns `true` if the event was signalled (and has been reset),
    /// `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut signalled = lock(&self.signalled);

        while !*signalled {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return false;
            }

            signalled = self
                .condvar
                .wait_timeout(signalled, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }

        *signalled = false;
        true
    }
}

/// An event that stays signalled until explicitly reset.
///
/// Every waiter is released once the event is signalled.
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl ManualResetEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the event, releasing all current and future waiters.
    pub fn signal(&self) {
        *lock(&self.signalled) = true;
        self.condvar.notify_all();
    }

    pub fn reset(&self) {
        *lock(&self.signalled) = false;
    }

    pub fn is_signalled(&self) -> bool {
        *lock(&self.signalled)
    }

    /// Blocks until the event is signalled.
    pub fn wait(&self) {
        let mut signalled = lock(&self.signalled);
        while !*signalled {
            signalled = self
                .condvar
                .wait(signalled)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

fn lock(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    #[test]
    fn auto_reset_consumes_signal() {
        let event = AutoResetEvent::new();
        event.signal();
        event.signal();

        assert!(event.wait_timeout(Duration::ZERO));
        assert!(!event.is_signalled());
        assert!(!event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn auto_reset_wakes_waiter_on_other_thread() {
        let event = Arc::new(AutoResetEvent::new());
        let signaller = event.clone();

        let handle = thread::spawn(move || signaller.signal());

        event.wait();
        handle.join().unwrap();
    }

    #[test]
    fn manual_reset_releases_every_waiter() {
        let event = Arc::new(ManualResetEvent::new());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let event = event.clone();
                thread::spawn(move || event.wait())
            })
            .collect();

        event.signal();
        for waiter in waiters {
            waiter.join().unwrap();
        }

        assert!(event.is_signalled());
        event.reset();
        assert!(!event.is_signalled());
    }
}
