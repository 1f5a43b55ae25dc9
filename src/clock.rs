//! Clock abstractions for Talos
//!
//! Two explicit time sources: a monotonic clock for dwell, retry and
//! cool-down timers (immune to wall-clock jumps) and the wall clock for
//! calendar work (test-run scheduling, quiet hours). Keeping them behind one
//! trait lets the deterministic test harness drive both.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Time source used by the driver
pub trait Clock: Send + Sync {
    /// Monotonic seconds since an arbitrary origin
    fn monotonic_secs(&self) -> f64;

    /// Current wall-clock time
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock backed by `Instant` and the system wall clock
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
    fn monotonic_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
