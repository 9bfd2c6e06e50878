//! Linux `epoll`-based wake primitive.
//!
//! The epoll instance watches two descriptors:
//! - an `eventfd` that other threads write to when they post work,
//! - a `CLOCK_MONOTONIC` `timerfd` armed for the next delayed task.
//!
//! The timerfd gives nanosecond deadlines, so delayed tasks are never rounded
//! to the millisecond granularity of `epoll_wait`. The epoll descriptor itself
//! is exposed as the raw handle: it polls readable whenever either source
//! fires, which is what a host event loop needs to drive an embedded loop.

use super::{RawWakeHandle, WakeEvent};

use libc::{
    CLOCK_MONOTONIC, EFD_CLOEXEC, EFD_NONBLOCK, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLLIN,
    TFD_CLOEXEC, TFD_NONBLOCK, epoll_create1, epoll_ctl, epoll_event, epoll_wait, eventfd,
    itimerspec, timerfd_create, timerfd_settime, timespec,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Token of the cross-thread wake-up eventfd.
const WAKE_TOKEN: u64 = 0;

/// Token of the deadline timerfd.
const TIMER_TOKEN: u64 = 1;

/// Linux wake primitive built on `epoll`, `eventfd` and `timerfd`.
#[derive(Debug)]
pub struct EpollWake {
    epoll: OwnedFd,
    eventfd: OwnedFd,
    timerfd: OwnedFd,
}

impl EpollWake {
    /// Creates the epoll instance and registers both wake sources.
    ///
    /// Fails if the process has run out of descriptors or kernel memory.
    pub fn new() -> io::Result<Self> {
        let epoll = owned(unsafe { epoll_create1(EPOLL_CLOEXEC) })?;
        let eventfd = owned(unsafe { eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) })?;
        let timerfd = owned(unsafe { timerfd_create(CLOCK_MONOTONIC, TFD_NONBLOCK | TFD_CLOEXEC) })?;

        register(&epoll, &eventfd, WAKE_TOKEN)?;
        register(&epoll, &timerfd, TIMER_TOKEN)?;

        Ok(Self {
            epoll,
            eventfd,
            timerfd,
        })
    }

    /// Arms the timerfd to expire after `timeout`, or disarms it.
    ///
    /// A zeroed `it_value` disarms a timerfd, so a zero timeout is bumped to
    /// one nanosecond.
    fn arm(&self, timeout: Option<Duration>) -> io::Result<()> {
        let value = match timeout {
            Some(timeout) => {
                let timeout = timeout.max(Duration::from_nanos(1));
                timespec {
                    tv_sec: libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX),
                    tv_nsec: timeout.subsec_nanos() as libc::c_long,
                }
            }
            None => timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
        };

        let spec = itimerspec {
            it_interval: timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
            it_value: value,
        };

        let rc = unsafe {
            timerfd_settime(
                self.timerfd.as_raw_fd(),
                0,
                &spec,
                std::ptr::null_mut(),
            )
        };

        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl WakeEvent for EpollWake {
    fn wait(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.arm(timeout)?;

        let mut events = [epoll_event { events: 0, u64: 0 }; 2];

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                events.as_mut_ptr(),
                events.len() as i32,
                -1,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for event in &events[..n as usize] {
            let token = event.u64;
            match token {
                WAKE_TOKEN => drain(&self.eventfd),
                TIMER_TOKEN => drain(&self.timerfd),
                _ => {}
            }
        }

        Ok(())
    }

    fn signal(&self) {
        let buf: u64 = 1;

        // EAGAIN means the counter is saturated, which is still a pending wake.
        unsafe {
            libc::write(
                self.eventfd.as_raw_fd(),
                &buf as *const u64 as *const libc::c_void,
                8,
            );
        }
    }

    fn clear(&self) {
        drain(&self.eventfd);
        drain(&self.timerfd);
    }

    fn raw_handle(&self) -> Option<RawWakeHandle> {
        Some(self.epoll.as_raw_fd())
    }
}

/// Takes ownership of a descriptor returned by a libc constructor.
fn owned(fd: RawFd) -> io::Result<OwnedFd> {
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn register(epoll: &OwnedFd, fd: &OwnedFd, token: u64) -> io::Result<()> {
    let mut event = epoll_event {
        events: EPOLLIN as u32,
        u64: token,
    };

    let rc = unsafe { epoll_ctl(epoll.as_raw_fd(), EPOLL_CTL_ADD, fd.as_raw_fd(), &mut event) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Resets a non-blocking eventfd or timerfd counter.
fn drain(fd: &OwnedFd) {
    let mut buf = 0u64;
    unsafe {
        libc::read(
            fd.as_raw_fd(),
            &mut buf as *mut u64 as *mut libc::c_void,
            8,
        );
    }
}
