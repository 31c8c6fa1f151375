//! Injected wall clock.
//!
//! Every component that reasons about time takes an `Arc<dyn Clock>` so that
//! schedules, commitment gates and protection windows can be exercised at any
//! instant in tests.

use chrono::{DateTime, Duration, FixedOffset, Local, Offset, Utc};
use std::sync::Mutex;

use crate::lock;

pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Offset of the user's local time zone at the current instant.
    fn offset(&self) -> FixedOffset;

    /// Current instant in local time. Schedules and windows are defined in
    /// local wall-clock time.
    fn local_now(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&self.offset())
    }
}

/// The system clock and the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        Local::now().offset().fix()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    /// A manual clock in UTC.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    pub fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        clock.advance(Duration::minutes(16));
        assert_eq!(clock.now().minute(), 16);
    }

    #[test]
    fn local_now_applies_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let clock =
            ManualClock::with_offset(Utc.with_ymd_and_hms(2026, 3, 2, 21, 30, 0).unwrap(), offset);
        assert_eq!(clock.local_now().hour(), 23);
    }
}
