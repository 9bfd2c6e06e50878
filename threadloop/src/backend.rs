//! The loop backend: sleep, wake, drain.
//!
//! A [`Backend`] owns the task queue of one message loop together with the
//! wake primitive and clock it runs on. It is responsible for:
//! - draining due tasks in `(due time, sequence)` order,
//! - sleeping until the next delayed task or a cross-thread wake-up,
//! - tracking the `Idle → Running → Terminating → Stopped` lifecycle,
//! - pumping due tasks on behalf of a host event loop.
//!
//! The backend is shared between the owning [`MessageLoop`] (strong
//! reference) and its task runners (weak references); everything here that
//! other threads call is `&self` and lock-free apart from the queue lock.
//!
//! [`MessageLoop`]: crate::MessageLoop

use crate::error::LoopError;
use crate::queue::TaskQueue;
use crate::task::Task;
use crate::time::Clock;
use crate::wake::{RawWakeHandle, WakeEvent};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

/// Lifecycle of a message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Created, not yet run.
    Idle,
    /// Inside [`MessageLoop::run`](crate::MessageLoop::run).
    Running,
    /// Termination requested; the current batch is finishing.
    Terminating,
    /// `run` has returned. The loop cannot run again.
    Stopped,
}

impl LoopState {
    const fn as_u8(self) -> u8 {
        match self {
            LoopState::Idle => 0,
            LoopState::Running => 1,
            LoopState::Terminating => 2,
            LoopState::Stopped => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            2 => LoopState::Terminating,
            _ => LoopState::Stopped,
        }
    }
}

pub(crate) struct Backend {
    queue: TaskQueue,
    wake: Box<dyn WakeEvent>,
    clock: Arc<dyn Clock>,
    state: AtomicU8,

    /// Set while [`Backend::run_expired_tasks_now`] is executing tasks.
    pumping: AtomicBool,
}

impl Backend {
    pub(crate) fn new(wake: Box<dyn WakeEvent>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: TaskQueue::new(),
            wake,
            clock,
            state: AtomicU8::new(LoopState::Idle.as_u8()),
            pumping: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn next_wake_time(&self) -> Option<Instant> {
        self.queue.next_wake_time()
    }

    pub(crate) fn raw_wake_handle(&self) -> Option<RawWakeHandle> {
        self.wake.raw_handle()
    }

    /// Queues `task` for `at` and wakes the loop.
    ///
    /// The wake-up happens after the insertion, so a loop that is about to
    /// sleep either sees the task or returns from its wait immediately.
    pub(crate) fn post(&self, task: Task, at: Instant) {
        self.queue.push(task, at);
        self.wake_up();
    }

    /// Wakes the loop so it re-examines its queue. Callable from any thread.
    #[inline]
    pub(crate) fn wake_up(&self) {
        self.wake.signal();
    }

    /// Requests termination. Callable from any thread; idempotent.
    ///
    /// A running loop finishes the batch it has already taken and then
    /// returns from [`run`](Self::run). A loop that has not been run yet
    /// will return from `run` immediately.
    pub(crate) fn terminate(&self) {
        let transitioned = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                match LoopState::from_u8(state) {
                    LoopState::Idle | LoopState::Running => Some(LoopState::Terminating.as_u8()),
                    LoopState::Terminating | LoopState::Stopped => None,
                }
            })
            .is_ok();

        if transitioned {
            tracing::debug!("message loop termination requested");
            self.wake_up();
        }
    }

    /// Runs the loop on the calling thread until terminated.
    ///
    /// `after_task` is invoked on this thread after every executed task.
    ///
    /// # Errors
    ///
    /// - [`LoopError::InvalidState`] if the loop has already been run,
    /// - [`LoopError::Wait`] if the wake primitive fails while sleeping.
    pub(crate) fn run(&self, after_task: &mut dyn FnMut()) -> Result<(), LoopError> {
        if let Err(found) = self.state.compare_exchange(
            LoopState::Idle.as_u8(),
            LoopState::Running.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match LoopState::from_u8(found) {
                LoopState::Terminating => {
                    self.set_state(LoopState::Stopped);
                    Ok(())
                }
                found => Err(LoopError::InvalidState {
                    expected: LoopState::Idle,
                    found,
                }),
            };
        }

        // Leaves the loop stopped even if a task unwinds through `run`.
        let _stopped = StopOnExit(self);

        tracing::debug!("message loop running");

        while self.state() == LoopState::Running {
            let batch = self.queue.take_due(self.now());
            if !batch.is_empty() {
                tracing::trace!(tasks = batch.len(), "draining due tasks");
            }

            for task in batch {
                task();
                after_task();
            }

            if self.state() != LoopState::Running {
                break;
            }

            let timeout = match self.queue.next_wake_time() {
                None => None,
                Some(at) => {
                    let now = self.now();
                    if at <= now {
                        continue;
                    }
                    Some(at - now)
                }
            };

            if let Err(err) = self.wake.wait(timeout) {
                tracing::error!(error = %err, "message loop wake primitive failed");
                return Err(LoopError::Wait(err));
            }
        }

        tracing::debug!(pending = self.queue.len(), "message loop stopped");
        Ok(())
    }

    /// Executes every task that is due now and returns the next wake time.
    ///
    /// This is the entry point for a host event loop driving this loop as a
    /// satellite source: call it whenever the raw wake handle polls ready or
    /// the previously returned instant has passed. A nested call made from
    /// inside a pumped task runs nothing.
    ///
    /// # Errors
    ///
    /// [`LoopError::InvalidState`] unless the loop is idle, i.e. it is not
    /// being driven by [`run`](Self::run) and has not been terminated.
    pub(crate) fn run_expired_tasks_now(
        &self,
        after_task: &mut dyn FnMut(),
    ) -> Result<Option<Instant>, LoopError> {
        match self.state() {
            LoopState::Idle => {}
            found => {
                return Err(LoopError::InvalidState {
                    expected: LoopState::Idle,
                    found,
                });
            }
        }

        if self.pumping.swap(true, Ordering::AcqRel) {
            return Ok(self.queue.next_wake_time());
        }

        let _pumping = ClearOnExit(&self.pumping);

        self.wake.clear();

        for task in self.queue.take_due(self.now()) {
            task();
            after_task();
        }

        Ok(self.queue.next_wake_time())
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

struct StopOnExit<'a>(&'a Backend);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        self.0.set_state(LoopState::Stopped);
    }
}

struct ClearOnExit<'a>(&'a AtomicBool);

impl Drop for ClearOnExit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
