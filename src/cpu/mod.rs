/*!
 * CPU Clock
 * Monotonic cycle accounting shared by the engine and the scheduler
 */

use crate::core::types::Cycles;
use std::sync::atomic::{AtomicU64, Ordering};

/// Simulated CPU clock
///
/// Cycles only ever move forward; the scheduler measures its round-robin
/// quantum as a window over this counter.
#[derive(Debug, Default)]
pub struct Clock {
    cycles: AtomicU64,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
        }
    }

    /// Consume `n` CPU cycles
    pub fn tick(&self, n: Cycles) {
        self.cycles.fetch_add(n, Ordering::Relaxed);
    }

    /// Total cycles elapsed since boot
    pub fn total(&self) -> Cycles {
        self.cycles.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate() {
        let clock = Clock::new();
        assert_eq!(clock.total(), 0);

        clock.tick(1);
        clock.tick(3);
        assert_eq!(clock.total(), 4);
    }
}
