//! Deterministic time for exercising message loops in tests.
//!
//! [`ManualClock`] only moves when told to, and [`ManualWake`] turns every
//! timed sleep of a loop into a jump of that clock. A loop installed with
//! both runs delayed tasks in virtual time: a task delayed by an hour fires
//! immediately, at exactly the instant it asked for.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use threadloop::MessageLoop;
//! use threadloop::testing::{ManualClock, ManualWake};
//!
//! std::thread::spawn(|| {
//!     let clock = Arc::new(ManualClock::new());
//!     MessageLoop::builder()
//!         .clock(clock.clone())
//!         .wake(ManualWake::new(clock.clone()))
//!         .install()
//!         .unwrap();
//!
//!     let message_loop = MessageLoop::current();
//!     message_loop.task_runner().post_delayed_task(
//!         || MessageLoop::current().terminate(),
//!         Duration::from_secs(3600),
//!     );
//!     message_loop.run().unwrap();
//!
//!     assert_eq!(clock.elapsed(), Duration::from_secs(3600));
//! })
//! .join()
//! .unwrap();
//! ```

use crate::sync::AutoResetEvent;
use crate::time::Clock;
use crate::wake::WakeEvent;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A clock that only advances when asked to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.lock() += by;
    }

    /// Moves the clock forward to `at`. Never moves it backwards.
    pub fn advance_to(&self, at: Instant) {
        let target = at.saturating_duration_since(self.origin);
        let mut offset = self.lock();
        if target > *offset {
            *offset = target;
        }
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Duration> {
        self.offset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

/// Wake primitive that advances a [`ManualClock`] instead of sleeping.
///
/// A timed wait jumps the clock to the deadline and returns. An untimed wait
/// really blocks until another thread signals, since no amount of virtual
/// time would make work appear.
#[derive(Debug)]
pub struct ManualWake {
    clock: Arc<ManualClock>,
    event: AutoResetEvent,
    sleeps: AtomicUsize,
}

impl ManualWake {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            event: AutoResetEvent::new(),
            sleeps: AtomicUsize::new(0),
        }
    }

    /// Number of timed waits that advanced the clock.
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::Relaxed)
    }
}

impl WakeEvent for ManualWake {
    fn wait(&self, timeout: Option<Duration>) -> io::Result<()> {
        if self.event.wait_timeout(Duration::ZERO) {
            return Ok(());
        }

        match timeout {
            Some(timeout) => {
                self.clock.advance(timeout);
                self.sleeps.fetch_add(1, Ordering::Relaxed);
            }
            None => self.event.wait(),
        }

        Ok(())
    }

    fn signal(&self) {
        self.event.signal();
    }

    fn clear(&self) {
        self.event.reset();
    }
}
