//! Monotonic time source
//!
//! Optimistic validation compares record write stamps against transaction
//! start times, so two distinct events must never share a reading. The
//! clock is anchored to `Instant` and tie-breaks through an atomic
//! high-water mark, making every `now()` strictly greater than every
//! earlier one across all threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use strand_core::Timestamp;

/// A strictly increasing process-local clock.
pub struct MonotonicClock {
    origin: Instant,
    last: AtomicU64,
}

impl MonotonicClock {
    /// Create a clock anchored at the current instant.
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    /// Read the clock. Every call returns a value strictly greater than
    /// every previous call on this clock, regardless of thread.
    pub fn now(&self) -> Timestamp {
        let raw = self.origin.elapsed().as_nanos() as u64;
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = raw.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
