//! Monotonic time sources.
//!
//! Every message loop reads "now" through a [`Clock`]. Production loops use
//! [`MonotonicClock`]; tests can swap in a manual clock to move time
//! explicitly (see [`crate::testing::ManualClock`]).
//!
//! Deadlines are always [`Instant`]s, so wall-clock adjustments never make a
//! delayed task fire early or starve it.

use std::time::{Duration, Instant};

/// Horizon used for delays too large to represent as an [`Instant`].
///
/// Roughly 30 years: the task stays queued and never becomes due in practice.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A source of monotonic time.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The system monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Returns `now + delay`, saturating to a far-future instant on overflow.
pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_after_adds_small_delays() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_millis(5)),
            now + Duration::from_millis(5)
        );
    }

    #[test]
    fn deadline_after_saturates_huge_delays() {
        let now = Instant::now();

        let deadline = deadline_after(now, Duration::MAX);
        assert_eq!(deadline, now + FAR_FUTURE);
        assert_eq!(deadline_after(now, Duration::from_secs(u64::MAX)), deadline);
    }
}
