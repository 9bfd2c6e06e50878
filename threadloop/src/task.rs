use std::cmp::Ordering;
use std::fmt;
use std::time::Instant;

/// A unit of work posted to a message loop.
///
/// Tasks capture whatever state they need by value and run exactly once on
/// the loop's thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An entry in a loop's task queue.
///
/// `ScheduledTask` pairs a task with the instant at which it becomes due and
/// the sequence number it was assigned when posted. Entries are stored in a
/// `BinaryHeap` ordered by `(at, sequence)`.
pub(crate) struct ScheduledTask {
    /// The instant at which the task becomes runnable.
    pub(crate) at: Instant,

    /// Insertion order, unique per queue.
    pub(crate) sequence: u64,

    pub(crate) task: Task,
}

impl ScheduledTask {
    fn key(&self) -> (Instant, u64) {
        (self.at, self.sequence)
    }
}

impl Eq for ScheduledTask {}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Ord for ScheduledTask {
    /// Orders entries by due time, then by sequence.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<ScheduledTask>`
    /// behaves as a min-heap and pops the earliest entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("at", &self.at)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
