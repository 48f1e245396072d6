// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source used for convergence and decision budgets.
pub trait Clock: Send + Sync + Debug {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock time.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Deterministic clock that advances by `step` on every read.
///
/// Budgets become a count of clock reads, which makes cutoffs reproducible.
///
/// ```rust
/// use std::time::Duration;
/// use the_statewood::engine::{Clock, SteppingClock};
///
/// let clock = SteppingClock::new(Duration::from_millis(1));
/// assert_eq!(clock.now(), Duration::from_millis(0));
/// assert_eq!(clock.now(), Duration::from_millis(1));
/// ```
#[derive(Debug)]
pub struct SteppingClock {
    step: Duration,
    ticks: AtomicU64,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            ticks: AtomicU64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.step.saturating_mul(u32::try_from(tick).unwrap_or(u32::MAX))
    }
}
