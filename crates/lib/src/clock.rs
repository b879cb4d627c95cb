//! Time provider abstraction.
//!
//! A [`Tree`](crate::Tree) stamps writes that do not carry an explicit
//! `updated_at` with the current time from its [`Clock`]. Production code uses
//! [`SystemClock`]; tests can use [`FixedClock`] for deterministic timestamps.

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::Timestamp;

/// A source of write timestamps.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> Timestamp;

    /// Returns the current time as an RFC3339-formatted string.
    fn now_rfc3339(&self) -> String {
        millis_to_rfc3339(self.now_millis())
    }
}

fn millis_to_rfc3339(millis: Timestamp) -> String {
    chrono::DateTime::from_timestamp_millis(millis as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string())
}

/// Production clock backed by [`std::time::SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// Test clock that auto-advances by one millisecond per `now_millis()` call,
/// so consecutive default-stamped writes always get strictly increasing
/// timestamps.
#[derive(Debug)]
pub struct FixedClock {
    millis: Mutex<Timestamp>,
}

impl FixedClock {
    /// Creates a clock starting at the given time in milliseconds.
    pub fn new(millis: Timestamp) -> Self {
        Self {
            millis: Mutex::new(millis),
        }
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance(&self, ms: Timestamp) {
        *self.millis.lock().unwrap() += ms;
    }

    /// Sets the clock to a specific time in milliseconds.
    pub fn set(&self, ms: Timestamp) {
        *self.millis.lock().unwrap() = ms;
    }

    /// Returns the current time without advancing.
    pub fn get(&self) -> Timestamp {
        *self.millis.lock().unwrap()
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1_704_067_200_000)
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> Timestamp {
        let mut millis = self.millis.lock().unwrap();
        let t = *millis;
        *millis += 1;
        t
    }
}
