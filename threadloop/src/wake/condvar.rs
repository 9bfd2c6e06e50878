//! Portable wake primitive built on a mutex and a condition variable.
//!
//! Used on targets without a dedicated OS backend. It has no pollable
//! handle, so a loop using it cannot be embedded in a host event loop.

use super::WakeEvent;
use crate::sync::AutoResetEvent;

use std::io;
use std::time::Duration;

/// Condition-variable wake primitive.
#[derive(Debug, Default)]
pub struct CondvarWake {
    event: AutoResetEvent,
}

impl CondvarWake {
    /// Creates the primitive. Never fails; the `Result` matches the OS
    /// backends.
    pub fn new() -> io::Result<Self> {
        Ok(Self::default())
    }
}

impl WakeEvent for CondvarWake {
    fn wait(&self, timeout: Option<Duration>) -> io::Result<()> {
        match timeout {
            Some(timeout) => {
                self.event.wait_timeout(timeout);
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
