//! # threadloop
//!
//! **threadloop** provides per-thread message loops: the cooperative task
//! scheduler every engine thread (platform, UI, GPU/raster, I/O) runs on.
//!
//! Each thread owns exactly one loop. The loop executes queued tasks on that
//! thread, one at a time and in a single well-defined order, and sleeps on a
//! platform wake primitive until the next delayed task is due or another
//! thread posts work. Other threads reach a loop only through its
//! [`TaskRunner`], a cheap, cloneable, `Send + Sync` handle.
//!
//! It offers:
//!
//! - **Ordered execution**: tasks run by due time, ties broken by post order,
//!   so immediate tasks always run in the order they were posted
//! - **Precise delayed tasks** on a monotonic clock (`timerfd` on Linux,
//!   `kqueue` on macOS/FreeBSD, Win32 events on Windows)
//! - **Task observers** fired after every task, for instrumentation
//! - **Embedding** in a host event loop through a pollable wake handle and
//!   [`MessageLoop::run_expired_tasks_now`]
//! - **Loop threads** and a [`ThreadHost`] owning an engine's thread set
//! - **Deterministic testing** with a manual clock ([`testing`])
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use threadloop::MessageLoop;
//!
//! let handle = std::thread::spawn(|| {
//!     MessageLoop::ensure_initialized_for_current_thread().unwrap();
//!     let message_loop = MessageLoop::current();
//!     let runner = message_loop.task_runner();
//!
//!     runner.post_task(|| println!("first"));
//!     runner.post_delayed_task(
//!         || MessageLoop::current().terminate(),
//!         Duration::from_millis(10),
//!     );
//!
//!     message_loop.run().unwrap();
//! });
//!
//! handle.join().unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`wake`] — Platform wake primitives
//! - [`testing`] — Manual clock and wake primitive for deterministic tests

mod backend;
mod error;
mod message_loop;
mod observer;
mod queue;
mod runner;
mod sync;
mod task;
mod thread;
mod thread_host;
mod time;

pub mod testing;
pub mod wake;

pub use backend::LoopState;
pub use error::LoopError;
pub use message_loop::{LoopBuilder, LoopId, MessageLoop};
pub use observer::ObserverKey;
pub use runner::TaskRunner;
pub use sync::{AutoResetEvent, ManualResetEvent};
pub use task::Task;
pub use thread::LoopThread;
pub use thread_host::{TaskRunners, ThreadHost, ThreadHostBuilder, ThreadTypes};
pub use time::{Clock, MonotonicClock};
