use crate::task::{ScheduledTask, Task};

use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Pending work for one message loop.
///
/// The queue is the ordering authority of its loop: every task, immediate or
/// delayed, is stored with its due instant and a sequence number, and tasks
/// come out ordered by `(due instant, sequence)`. Immediate tasks are simply
/// tasks due at their post time, so they keep post order among themselves.
///
/// The lock is only held to insert an entry or to extract a due batch; tasks
/// never run while it is held.
pub(crate) struct TaskQueue {
    inner: Mutex<Inner>,
}

struct Inner {
    heap: BinaryHeap<ScheduledTask>,
    next_sequence: u64,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_sequence: 0,
            }),
        }
    }

    /// Queues `task` to become due at `at`.
    ///
    /// The sequence number is taken under the same lock that performs the
    /// insertion, so two tasks due at the same instant always come out in
    /// the order they were pushed.
    pub(crate) fn push(&self, task: Task, at: Instant) {
        let mut inner = self.lock();

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        inner.heap.push(ScheduledTask { at, sequence, task });
    }

    /// Removes and returns every task due at or before `now`, in order.
    ///
    /// The read and the removal happen under one lock acquisition, so
    /// concurrent producers cannot interleave between them.
    pub(crate) fn take_due(&self, now: Instant) -> Vec<Task> {
        let mut inner = self.lock();
        let mut due = Vec::new();

        while inner.heap.peek().is_some_and(|entry| entry.at <= now) {
            if let Some(entry) = inner.heap.pop() {
                due.push(entry.task);
            }
        }

        due
    }

    /// Returns the due instant of the earliest pending task.
    pub(crate) fn next_wake_time(&self) -> Option<Instant> {
        self.lock().heap.peek().map(|entry| entry.at)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Locks the queue.
    ///
    /// Tasks never run under this lock, so a poisoned lock only means a
    /// producer panicked mid-push; the heap itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
