//! Software clock running off a free-running millisecond counter.
//!
//! Useful as a fallback when no RTC chip is fitted, or to avoid bus traffic
//! on every read: set it once from the hardware clock and read it locally.

use rtcc::{DateTimeAccess, NaiveDateTime};

use crate::datetime::{CalendarTime, DateTimeError};

/// Source of milliseconds elapsed since some arbitrary start point,
/// eg a SysTick counter. The value is expected to wrap at `u32::MAX`.
pub trait Millis {
  fn millis(&mut self) -> u32;
}

impl<F> Millis for F
  where
    F: FnMut() -> u32,
{
  fn millis(&mut self) -> u32 {
    self()
  }
}

/// Clock derived from a `Millis` source plus an offset to Unix time.
///
/// The millisecond counter wraps after about 49.7 days, at which point the
/// clock jumps back by the same amount. Call `adjust` again well before
/// then, eg periodically from the hardware RTC.
pub struct SoftRtc<M> {
  millis: M,
  // Unix time at millis() == 0
  offset: u32,
}

impl<M: Millis> SoftRtc<M> {

  /// New clock reading 2000-01-01T00:00:00 at the moment of creation
  pub fn new(millis: M) -> Self {
    let mut clock = SoftRtc { millis, offset: 0 };
    clock.adjust(&CalendarTime::EPOCH_2000);
    clock
  }

  /// Set the clock to `time`
  pub fn adjust(&mut self, time: &CalendarTime) {
    let elapsed = self.millis.millis() / 1000;
    self.offset = time.to_unix_time().wrapping_sub(elapsed);
    log::debug!("soft rtc adjusted to {}", time);
  }

  /// Current Unix time in seconds
  pub fn unix_time(&mut self) -> u32 {
    self.offset.wrapping_add(self.millis.millis() / 1000)
  }

  pub fn now(&mut self) -> CalendarTime {
    CalendarTime::from_unix_time(self.unix_time())
  }

  /// Give back the millisecond source
  pub fn release(self) -> M {
    self.millis
  }
}

impl<M: Millis> DateTimeAccess for SoftRtc<M> {
  type Error = DateTimeError;

  fn datetime(&mut self) -> Result<NaiveDateTime, Self::Error> {
    let time = CalendarTime::try_from_unix_time(self.unix_time())?;
    NaiveDateTime::try_from(time)
  }

  fn set_datetime(&mut self, datetime: &NaiveDateTime) -> Result<(), Self::Error> {
    let time = CalendarTime::try_from(datetime)?;
    self.adjust(&time);
    Ok(())
  }
}
