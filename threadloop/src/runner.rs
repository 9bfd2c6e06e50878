//! Cross-thread handles for posting work to a message loop.

use crate::backend::Backend;
use crate::message_loop::LoopId;
use crate::task::Task;
use crate::time::deadline_after;

use std::sync::Weak;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// A handle used to post tasks to one message loop.
///
/// `TaskRunner` is cheap to clone and can be sent to and shared between any
/// threads. It does not keep its loop alive: once the loop's thread has torn
/// the loop down, every post is silently dropped.
///
/// # Examples
///
/// ```rust
/// use threadloop::{LoopThread, MessageLoop};
///
/// let worker = LoopThread::spawn("worker").unwrap();
/// let runner = worker.task_runner();
///
/// let (tx, rx) = std::sync::mpsc::channel();
/// runner.post_task(move || {
///     tx.send(MessageLoop::current().id()).unwrap();
/// });
///
/// assert_eq!(rx.recv().unwrap(), runner.loop_id());
/// worker.join().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct TaskRunner {
    backend: Weak<Backend>,
    thread: ThreadId,
    loop_id: LoopId,
}

impl TaskRunner {
    pub(crate) fn new(backend: Weak<Backend>, thread: ThreadId, loop_id: LoopId) -> Self {
        Self {
            backend,
            thread,
            loop_id,
        }
    }

    /// Posts `task` to run as soon as possible, after every task already due.
    pub fn post_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_with(Box::new(task), |backend| backend.now());
    }

    /// Posts `task` to run once `delay` has elapsed.
    ///
    /// Delays too large to represent are clamped to a horizon decades away,
    /// so the task stays pending for the life of the loop.
    pub fn post_delayed_task<F>(&self, task: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_with(Box::new(task), |backend| deadline_after(backend.now(), delay));
    }

    /// Posts `task` to run at `target`.
    ///
    /// A target in the past makes the task due on the next drain.
    pub fn post_task_for_time<F>(&self, task: F, target: Instant)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_with(Box::new(task), |_| target);
    }

    /// Runs `task` inline when called on the loop's thread, posts it
    /// otherwise.
    pub fn run_now_or_post_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.runs_tasks_on_current_thread() {
            task();
        } else {
            self.post_task(task);
        }
    }

    /// Returns `true` if the calling thread is the loop's thread.
    pub fn runs_tasks_on_current_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// Asks the target loop to terminate. No-op if it is already gone.
    ///
    /// Tasks already taken for execution still run; no later batch starts.
    pub fn terminate(&self) {
        if let Some(backend) = self.backend.upgrade() {
            backend.terminate();
        }
    }

    /// Identity of the loop this runner posts to.
    pub fn loop_id(&self) -> LoopId {
        self.loop_id
    }

    fn post_with(&self, task: Task, at: impl FnOnce(&Backend) -> Instant) {
        match self.backend.upgrade() {
            Some(backend) => backend.post(task, at(&backend)),
            None => {
                tracing::trace!(loop_id = %self.loop_id, "message loop is gone, dropping task");
            }
        }
    }
}

impl PartialEq for TaskRunner {
    /// Two runners are equal when they post to the same loop.
    fn eq(&self, other: &Self) -> bool {
        self.loop_id == other.loop_id
    }
}

impl Eq for TaskRunner {}
