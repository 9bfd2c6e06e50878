//! kqueue-based wake primitive for macOS, iOS and FreeBSD.
//!
//! Cross-thread wake-ups use an `EVFILT_USER` event registered with
//! `EV_CLEAR`, so every trigger collapses into one pending notification until
//! the owner consumes it. Deadlines are passed to `kevent` as a `timespec`,
//! which keeps nanosecond precision.

use super::{RawWakeHandle, WakeEvent};

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr;
use std::time::Duration;

/// Identifier of the user event inside the kqueue.
const WAKE_IDENT: usize = 0;

/// Wake primitive built on a kqueue `EVFILT_USER` event.
#[derive(Debug)]
pub struct KqueueWake {
    kq: OwnedFd,
}

impl KqueueWake {
    /// Creates the kqueue and registers the user event.
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::kqueue() };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let kq = unsafe { OwnedFd::from_raw_fd(fd) };

        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }

        let wake = Self { kq };
        wake.change(libc::EV_ADD | libc::EV_CLEAR, 0)?;

        Ok(wake)
    }

    /// Applies one change to the user event.
    fn change(&self, flags: u16, fflags: u32) -> io::Result<()> {
        let mut event = user_event();
        event.flags = flags;
        event.fflags = fflags;

        let rc = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                &event,
                1,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };

        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn collect(&self, timeout: Option<&libc::timespec>) -> io::Result<()> {
        let mut event = user_event();

        let rc = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                ptr::null(),
                0,
                &mut event,
                1,
                timeout.map_or(ptr::null(), |t| t as *const libc::timespec),
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        Ok(())
    }
}

impl WakeEvent for KqueueWake {
    fn wait(&self, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = timeout.map(|t| libc::timespec {
            tv_sec: libc::time_t::try_from(t.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_nsec: t.subsec_nanos() as libc::c_long,
        });

        self.collect(timeout.as_ref())
    }

    fn signal(&self) {
        if let Err(err) = self.change(0, libc::NOTE_TRIGGER) {
            tracing::error!(error = %err, "failed to trigger kqueue wake event");
        }
    }

    fn clear(&self) {
        let zero = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        let _ = self.collect(Some(&zero));
    }

    fn raw_handle(&self) -> Option<RawWakeHandle> {
        Some(self.kq.as_raw_fd())
    }
}

fn user_event() -> libc::kevent {
    // Zeroing keeps this portable across the per-platform `kevent` layouts.
    let mut event: libc::kevent = unsafe { mem::zeroed() };
    event.ident = WAKE_IDENT as _;
    event.filter = libc::EVFILT_USER;
    event
}
