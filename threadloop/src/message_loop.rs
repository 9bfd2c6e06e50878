//! The per-thread message loop and its thread-local slot.
//!
//! Each thread owns at most one [`MessageLoop`], stored in a thread-local
//! slot populated by [`MessageLoop::ensure_initialized_for_current_thread`]
//! (or [`LoopBuilder::install`]) and cleared when the thread exits. The loop
//! holds the only strong reference to its backend and task queue; the task
//! runners it hands out hold weak ones.

use crate::backend::{Backend, LoopState};
use crate::error::LoopError;
use crate::observer::{ObserverKey, TaskObservers};
use crate::runner::TaskRunner;
use crate::time::{Clock, MonotonicClock};
use crate::wake::{PlatformWake, RawWakeHandle, WakeEvent};

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

thread_local! {
    /// The message loop of the current thread, if one has been installed.
    static CURRENT_LOOP: RefCell<Option<Rc<MessageLoop>>> = const { RefCell::new(None) };
}

/// Process-unique identity of a message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u64);

impl LoopId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        LoopId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop-{}", self.0)
    }
}

/// A thread's message loop.
///
/// The loop executes tasks posted through its [`TaskRunner`] on the thread
/// that created it, in `(due time, post order)` order, one at a time.
///
/// A `MessageLoop` never leaves its thread; use [`MessageLoop::current`] to
/// reach it from code running on that thread, and [`MessageLoop::task_runner`]
/// to obtain a handle other threads can use.
pub struct MessageLoop {
    id: LoopId,
    backend: Arc<Backend>,
    runner: TaskRunner,
    observers: TaskObservers,
}

impl MessageLoop {
    /// Returns a builder for configuring the current thread's loop.
    pub fn builder() -> LoopBuilder {
        LoopBuilder::new()
    }

    /// Creates the current thread's message loop if it does not exist yet.
    ///
    /// Calling this again on the same thread is a no-op.
    ///
    /// # Errors
    ///
    /// [`LoopError::WakeCreation`] if the platform wake primitive cannot be
    /// created. No loop is installed in that case.
    pub fn ensure_initialized_for_current_thread() -> Result<(), LoopError> {
        LoopBuilder::new().install()
    }

    /// Returns `true` if the current thread has a message loop.
    pub fn is_initialized_for_current_thread() -> bool {
        Self::try_current().is_some()
    }

    /// Returns the current thread's message loop.
    ///
    /// # Panics
    ///
    /// Panics if [`ensure_initialized_for_current_thread`] has not been
    /// called on this thread. This is a bug in the caller.
    ///
    /// [`ensure_initialized_for_current_thread`]: Self::ensure_initialized_for_current_thread
    pub fn current() -> Rc<MessageLoop> {
        match Self::try_current() {
            Some(message_loop) => message_loop,
            None => panic!(
                "MessageLoop::ensure_initialized_for_current_thread was not called on thread {:?}",
                thread::current().name().unwrap_or("<unnamed>")
            ),
        }
    }

    /// Returns the current thread's message loop, if any.
    ///
    /// Also returns `None` while the thread's locals are being destroyed.
    pub fn try_current() -> Option<Rc<MessageLoop>> {
        CURRENT_LOOP
            .try_with(|current| current.borrow().clone())
            .ok()
            .flatten()
    }

    fn new(wake: Box<dyn WakeEvent>, clock: Arc<dyn Clock>) -> Self {
        let id = LoopId::next();
        let backend = Arc::new(Backend::new(wake, clock));
        let runner = TaskRunner::new(Arc::downgrade(&backend), thread::current().id(), id);

        Self {
            id,
            backend,
            runner,
            observers: TaskObservers::new(),
        }
    }

    /// Identity of this loop.
    pub fn id(&self) -> LoopId {
        self.id
    }

    /// Returns a task runner posting to this loop.
    pub fn task_runner(&self) -> TaskRunner {
        self.runner.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.backend.state()
    }

    /// Runs the loop on this thread until [`terminate`](Self::terminate) is
    /// called.
    ///
    /// A loop runs at most once. If it was terminated before being run, this
    /// returns immediately.
    ///
    /// # Errors
    ///
    /// - [`LoopError::InvalidState`] if the loop has already run,
    /// - [`LoopError::Wait`] if the wake primitive fails.
    pub fn run(&self) -> Result<(), LoopError> {
        self.backend.run(&mut || self.observers.notify())
    }

    /// Stops the loop once the tasks already taken for execution have run.
    ///
    /// Safe to call from a task. Idempotent.
    pub fn terminate(&self) {
        self.backend.terminate();
    }

    /// Registers `callback` to fire after every executed task.
    ///
    /// Registering again under the same key replaces the previous callback.
    pub fn add_task_observer<F>(&self, key: ObserverKey, callback: F)
    where
        F: Fn() + 'static,
    {
        self.observers.add(key, Rc::new(callback));
    }

    /// Removes the observer registered under `key`, if any.
    pub fn remove_task_observer(&self, key: ObserverKey) {
        self.observers.remove(key);
    }

    /// Runs every task due now and returns when the next task is due.
    ///
    /// Used when a host event loop drives this loop instead of
    /// [`run`](Self::run): the host polls [`raw_wake_handle`] and calls this
    /// whenever it is ready or the returned instant has passed.
    ///
    /// # Errors
    ///
    /// [`LoopError::InvalidState`] if the loop is running or terminated.
    ///
    /// [`raw_wake_handle`]: Self::raw_wake_handle
    pub fn run_expired_tasks_now(&self) -> Result<Option<Instant>, LoopError> {
        self.backend
            .run_expired_tasks_now(&mut || self.observers.notify())
    }

    /// Pollable handle of the loop's wake primitive, when it has one.
    pub fn raw_wake_handle(&self) -> Option<RawWakeHandle> {
        self.backend.raw_wake_handle()
    }

    /// Due instant of the earliest pending task.
    pub fn next_wake_time(&self) -> Option<Instant> {
        self.backend.next_wake_time()
    }

    /// Number of tasks waiting in the queue.
    pub fn pending_task_count(&self) -> usize {
        self.backend.pending_tasks()
    }
}

impl fmt::Debug for MessageLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageLoop")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pending_tasks", &self.pending_task_count())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Drop for MessageLoop {
    fn drop(&mut self) {
        tracing::debug!(
            loop_id = %self.id,
            dropped_tasks = self.backend.pending_tasks(),
            "message loop destroyed"
        );
    }
}

/// Configures and installs the current thread's message loop.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use threadloop::{MessageLoop, MonotonicClock, wake::CondvarWake};
///
/// std::thread::spawn(|| {
///     MessageLoop::builder()
///         .clock(Arc::new(MonotonicClock))
///         .wake(CondvarWake::new().unwrap())
///         .install()
///         .unwrap();
///
///     assert!(MessageLoop::current().raw_wake_handle().is_none());
/// })
/// .join()
/// .unwrap();
/// ```
#[derive(Default)]
pub struct LoopBuilder {
    clock: Option<Arc<dyn Clock>>,
    wake: Option<WakeFactory>,
}

type WakeFactory = Box<dyn FnOnce() -> io::Result<Box<dyn WakeEvent>>>;

impl LoopBuilder {
    /// Creates a builder using the system clock and the platform wake
    /// primitive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock the loop reads time from.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the wake primitive the loop sleeps on.
    pub fn wake<W: WakeEvent>(self, wake: W) -> Self {
        self.wake_with(move || Ok(wake))
    }

    /// Sets a constructor for the wake primitive, run by [`install`].
    ///
    /// A failing constructor makes [`install`] return
    /// [`LoopError::WakeCreation`].
    ///
    /// [`install`]: Self::install
    pub fn wake_with<W, F>(mut self, make: F) -> Self
    where
        W: WakeEvent,
        F: FnOnce() -> io::Result<W> + 'static,
    {
        self.wake = Some(Box::new(move || {
            make().map(|wake| Box::new(wake) as Box<dyn WakeEvent>)
        }));
        self
    }

    /// Installs the configured loop on the current thread.
    ///
    /// If the thread already has a loop, it is kept and the configuration is
    /// discarded.
    ///
    /// # Errors
    ///
    /// [`LoopError::WakeCreation`] if the wake primitive cannot be created.
    /// Nothing is installed in that case.
    pub fn install(self) -> Result<(), LoopError> {
        if MessageLoop::is_initialized_for_current_thread() {
            return Ok(());
        }

        let created = match self.wake {
            Some(make) => make(),
            None => PlatformWake::new().map(|wake| Box::new(wake) as Box<dyn WakeEvent>),
        };
        let wake = created.map_err(|err| {
            tracing::error!(error = %err, "failed to create message loop wake primitive");
            LoopError::WakeCreation(err)
        })?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock));

        let message_loop = Rc::new(MessageLoop::new(wake, clock));

        tracing::debug!(
            loop_id = %message_loop.id,
            thread = thread::current().name().unwrap_or("<unnamed>"),
            "message loop created"
        );

        CURRENT_LOOP.with(|current| *current.borrow_mut() = Some(message_loop));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_initialized_is_idempotent() {
        thread::spawn(|| {
            assert!(!MessageLoop::is_initialized_for_current_thread());

            MessageLoop::ensure_initialized_for_current_thread().unwrap();
            let first = MessageLoop::current().id();

            MessageLoop::ensure_initialized_for_current_thread().unwrap();
            assert_eq!(MessageLoop::current().id(), first);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn current_without_loop_panics() {
        let result = thread::spawn(|| {
            let _ = MessageLoop::current();
        })
        .join();

        assert!(result.is_err());
    }

    #[test]
    fn failed_wake_creation_installs_nothing() {
        thread::spawn(|| {
            let result = MessageLoop::builder()
                .wake_with(|| -> io::Result<crate::wake::CondvarWake> {
                    Err(io::Error::from_raw_os_error(24))
                })
                .install();

            assert!(matches!(result, Err(LoopError::WakeCreation(_))));
            assert!(!MessageLoop::is_initialized_for_current_thread());
            assert!(MessageLoop::try_current().is_none());

            MessageLoop::ensure_initialized_for_current_thread().unwrap();
            assert!(MessageLoop::is_initialized_for_current_thread());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn loop_ids_are_unique() {
        let a = LoopId::next();
        let b = LoopId::next();
        assert_ne!(a, b);
        assert_eq!(format!("{a}"), format!("loop-{}", a.0));
    }
}
