//! The benchmark's "current trace second" time source.
//!
//! Per the redesign guidance against implicit global time reads: policies
//! never consult a clock themselves. Instead the harness (or a test) owns a
//! [`TraceClock`], advances it as it replays a trace, and passes the current
//! value explicitly into every call that needs "now" (`record_access`,
//! `allocate_and_insert`, ghost-table age checks).

use core::sync::atomic::{AtomicU32, Ordering};

/// A process-wide "current trace second" counter.
///
/// Not a wall clock: its value is whatever the harness driving the cache
/// says it is, typically the timestamp field of the trace record currently
/// being replayed.
#[derive(Debug, Default)]
pub struct TraceClock {
    now: AtomicU32,
}

impl TraceClock {
    /// Create a clock starting at second 0.
    pub const fn new() -> Self {
        Self {
            now: AtomicU32::new(0),
        }
    }

    /// Create a clock starting at the given second.
    pub const fn starting_at(now: u32) -> Self {
        Self {
            now: AtomicU32::new(now),
        }
    }

    /// Read the current second.
    #[inline]
    pub fn get(&self) -> u32 {
        self.now.load(Ordering::Acquire)
    }

    /// Advance the clock to `now`, if `now` is not behind the current value.
    ///
    /// Trace replay threads race to advance this monotonically; a thread
    /// that observes a timestamp behind the current value (reordered
    /// partitions under multithreaded replay) is a no-op rather than a
    /// rollback.
    #[inline]
    pub fn advance_to(&self, now: u32) {
        let mut cur = self.now.load(Ordering::Relaxed);
        while now > cur {
            match self.now.compare_exchange_weak(
                cur,
                now,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => cur = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_starts_at_zero() {
        let clock = TraceClock::new();
        assert_eq!(clock.get(), 0);
    }

    #[test]
    fn test_advance_to_moves_forward() {
        let clock = TraceClock::new();
        clock.advance_to(10);
        assert_eq!(clock.get(), 10);
    }

    #[test]
    fn test_advance_to_ignores_rollback() {
        let clock = TraceClock::starting_at(100);
        clock.advance_to(50);
        assert_eq!(clock.get(), 100);
    }
}
