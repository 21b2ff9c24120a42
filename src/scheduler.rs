//! Fixed-cadence loop timing.
//!
//! Both loops wake on a grid anchored at their start time:
//!
//! ```text
//!   start        start+P      start+2P     start+3P
//!     │  cycle ░░   │  cycle ░   │  cycle ░░░░│░░░░  (overrun)  │
//!     ▼             ▼            ▼            ▼      skipped    ▼
//! ```
//!
//! The next wake is always the previous *intended* wake plus the period,
//! so cycle runtime never accumulates as drift.  A cycle that overruns
//! one or more whole periods skips the missed slots instead of firing a
//! burst of back-to-back cycles to catch up.

use log::warn;

use crate::app::ports::MicrosClock;

/// Outcome of scheduling the next wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextWake {
    /// How long to sleep from `now`.
    pub sleep_ms: u64,
    /// Grid slots skipped because the last cycle overran them.
    pub missed: u64,
}

/// Deadline bookkeeping for one periodic loop.
#[derive(Debug, Clone)]
pub struct PeriodicTicker {
    label: &'static str,
    period_ms: u64,
    next_wake_ms: u64,
}

impl PeriodicTicker {
    /// Anchor the grid at `start_ms`; the first cycle is due immediately.
    pub fn new(label: &'static str, start_ms: u64, period_ms: u64) -> Self {
        Self {
            label,
            period_ms: period_ms.max(1),
            next_wake_ms: start_ms,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Advance to the next grid point after the cycle that just finished.
    pub fn advance(&mut self, now_ms: u64) -> NextWake {
        self.next_wake_ms += self.period_ms;
        let mut missed = 0;
        if now_ms >= self.next_wake_ms {
            missed = (now_ms - self.next_wake_ms) / self.period_ms + 1;
            self.next_wake_ms += missed * self.period_ms;
        }
        NextWake {
            sleep_ms: self.next_wake_ms - now_ms,
            missed,
        }
    }

    /// Advance and block the calling thread until the next grid point.
    pub fn sleep_until_next(&mut self, clock: &impl MicrosClock) {
        let next = self.advance(clock.now_us() / 1_000);
        if next.missed > 0 {
            warn!(
                "{}: cycle overran, skipped {} period(s)",
                self.label, next.missed
            );
        }
        std::thread::sleep(std::time::Duration::from_millis(next.sleep_ms));
    }
}
