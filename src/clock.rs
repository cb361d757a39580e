//! Host clock capability
//!
//! The writer reads "now" only when a session starts. Production uses the
//! monotonic [`HostClock`]; tests and simulations drive a [`ManualClock`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::media::Timestamp;

/// Source of monotonic host time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic host clock, measured in nanoseconds from the clock's creation
#[derive(Debug, Clone)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.origin.elapsed())
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, time: Timestamp) {
        *self.now.lock() = time;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        let advanced = now.as_duration() + by;
        *now = Timestamp::from_duration(advanced);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
