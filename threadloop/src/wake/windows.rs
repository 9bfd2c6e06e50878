//! Windows wake primitive built on an auto-reset Win32 event.
//!
//! `SetEvent` on an auto-reset event that is already signalled is a no-op,
//! which gives the coalescing behavior the loop relies on. Timeouts are
//! rounded up to whole milliseconds so a wait never ends before its deadline.

use super::{RawWakeHandle, WakeEvent};

use std::io;
use std::ptr;
use std::time::Duration;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED};
use windows_sys::Win32::System::Threading::{
    CreateEventW, INFINITE, ResetEvent, SetEvent, WaitForSingleObject,
};

/// Wake primitive wrapping an auto-reset event `HANDLE`.
#[derive(Debug)]
pub struct EventWake {
    handle: HANDLE,
}

// Safety: Win32 event handles may be signalled and waited on from any thread.
unsafe impl Send for EventWake {}
unsafe impl Sync for EventWake {}

impl EventWake {
    /// Creates an unnamed, initially non-signalled auto-reset event.
    pub fn new() -> io::Result<Self> {
        let handle = unsafe { CreateEventW(ptr::null(), 0, 0, ptr::null()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { handle })
    }
}

impl WakeEvent for EventWake {
    fn wait(&self, timeout: Option<Duration>) -> io::Result<()> {
        let millis = match timeout {
            Some(timeout) => timeout
                .as_nanos()
                .div_ceil(1_000_000)
                .min(u128::from(INFINITE - 1)) as u32,
            None => INFINITE,
        };

        let rc = unsafe { WaitForSingleObject(self.handle, millis) };
        if rc == WAIT_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn signal(&self) {
        if unsafe { SetEvent(self.handle) } == 0 {
            tracing::error!(
                error = %io::Error::last_os_error(),
                "failed to signal wake event"
            );
        }
    }

    fn clear(&self) {
        unsafe {
            ResetEvent(self.handle);
        }
    }

    fn raw_handle(&self) -> Option<RawWakeHandle> {
        Some(self.handle as RawWakeHandle)
    }
}

impl Drop for EventWake {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
