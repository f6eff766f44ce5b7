//! Sources of "now" for valid-time bookkeeping.

use std::{
  fmt,
  sync::atomic::{AtomicI64, Ordering},
};

use chrono::{DateTime, TimeDelta, Utc};

/// Supplies the transition time for every mutation.
///
/// The engine does not trust the clock to be monotonic; it clamps each
/// transition to the last boundary of the affected chain.
pub trait Clock: Send + Sync + fmt::Debug {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to. Used by tests and replays.
#[derive(Debug)]
pub struct ManualClock {
  micros: AtomicI64,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      micros: AtomicI64::new(start.timestamp_micros()),
    }
  }

  pub fn set(&self, at: DateTime<Utc>) {
    self.micros.store(at.timestamp_micros(), Ordering::SeqCst);
  }

  /// Move the clock by `by`, saturating at the ends of the representable
  /// range.
  pub fn advance(&self, by: TimeDelta) {
    let delta = by.num_microseconds().unwrap_or(if by < TimeDelta::zero() {
      i64::MIN
    } else {
      i64::MAX
    });
    let _ = self
      .micros
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |micros| {
        Some(micros.saturating_add(delta))
      });
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    let micros = self.micros.load(Ordering::SeqCst);
    DateTime::from_timestamp_micros(micros).unwrap_or(if micros < 0 {
      DateTime::<Utc>::MIN_UTC
    } else {
      DateTime::<Utc>::MAX_UTC
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn manual_clock_moves_only_when_told() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(TimeDelta::seconds(90));
    assert_eq!(clock.now(), start + TimeDelta::seconds(90));

    clock.set(start);
    assert_eq!(clock.now(), start);
  }

  #[test]
  fn manual_clock_saturates_instead_of_wrapping() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(start);

    clock.advance(TimeDelta::MAX);
    assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);
    clock.advance(TimeDelta::MAX);
    assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);

    // Pinned at i64::MAX micros, so stepping back lands exactly on start.
    let back = i64::MAX - start.timestamp_micros();
    clock.advance(TimeDelta::microseconds(-back));
    assert_eq!(clock.now(), start);

    clock.set(start);
    clock.advance(TimeDelta::MIN);
    clock.advance(TimeDelta::MIN);
    assert_eq!(clock.now(), DateTime::<Utc>::MIN_UTC);
  }
}
