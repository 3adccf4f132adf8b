//! Injectable time source.
//!
//! Safety scoring, debouncing, retention sweeps and ETA estimates all depend
//! on "now". Routing every read of the current time through [`Clock`] keeps
//! those computations deterministic under test.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// A source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// ```
/// use safedupe::clock::{Clock, ManualClock};
/// use chrono::Duration;
///
/// let clock = ManualClock::new(chrono::Utc::now());
/// let start = clock.now();
/// clock.advance(Duration::minutes(5));
/// assert_eq!(clock.now() - start, Duration::minutes(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared handle used by components that need a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Convenience constructor for the wall clock.
#[must_use]
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
