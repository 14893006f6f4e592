//! Time source for token timestamps and key cache expiry
//!
//! Every component that reads the time takes an `Arc<dyn Clock>` at
//! construction, so tests can pin or advance time without touching globals.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Supplies the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Current time as seconds since the Unix epoch
    fn unix_now(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock
///
/// Clones share the same instant, so a test can hand one clone to a client and
/// keep another to move time forward.
///
/// ```rust
/// use authmint::{Clock, MockClock};
///
/// let clock = MockClock::at_unix(1_700_000_000);
/// clock.advance_secs(30);
/// assert_eq!(clock.unix_now(), 1_700_000_030);
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a clock fixed at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Create a clock fixed at a Unix timestamp
    ///
    /// Out-of-range timestamps fall back to the epoch.
    pub fn at_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Move the clock to `now`
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move the clock forward by `secs` seconds
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now += Duration::seconds(secs);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
