//! Platform wake primitives.
//!
//! A message loop sleeps on a [`WakeEvent`] between batches of work and any
//! thread can signal it to make the loop look at its queue again.
//!
//! The wake event is used by the loop backend to:
//! - block until the next delayed task is due,
//! - return early when another thread posts work or terminates the loop,
//! - expose a pollable handle when the loop is embedded in a host event loop.
//!
//! The concrete implementation is selected at compile time depending on the
//! target operating system and exported as [`PlatformWake`].

mod condvar;

pub use condvar::CondvarWake;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
mod kqueue;

#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub type PlatformWake = epoll::EpollWake;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub type PlatformWake = kqueue::KqueueWake;

#[cfg(windows)]
pub type PlatformWake = windows::EventWake;

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    windows
)))]
pub type PlatformWake = CondvarWake;

use std::io;
use std::time::Duration;

/// Raw OS handle of a wake primitive, for host event loops to poll.
#[cfg(unix)]
pub type RawWakeHandle = std::os::fd::RawFd;

/// Raw OS handle of a wake primitive, for host event loops to poll.
#[cfg(windows)]
pub type RawWakeHandle = std::os::windows::io::RawHandle;

/// Raw OS handle of a wake primitive, for host event loops to poll.
#[cfg(not(any(unix, windows)))]
pub type RawWakeHandle = usize;

/// A blocking primitive a loop thread sleeps on and other threads signal.
///
/// Implementations must be coalescing: any number of [`signal`] calls made
/// while the owner is not waiting collapse into a single early return from
/// the next [`wait`], and a signal is never lost.
///
/// [`signal`]: WakeEvent::signal
/// [`wait`]: WakeEvent::wait
pub trait WakeEvent: Send + Sync + 'static {
    /// Blocks the owning thread until signalled or until `timeout` elapses.
    ///
    /// `None` waits without a deadline. A pending signal is consumed.
    /// Spurious early returns are allowed; interrupted waits return `Ok`.
    fn wait(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Wakes the owning thread. Callable from any thread at any time.
    fn signal(&self);

    /// Consumes a pending signal without blocking.
    fn clear(&self);

    /// Returns a handle that becomes ready when the event is signalled.
    fn raw_handle(&self) -> Option<RawWakeHandle> {
        None
    }
}
