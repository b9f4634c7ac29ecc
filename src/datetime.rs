//! Calendar arithmetic for the 2000..2099 window used by the DS1307.
//!
//! `CalendarTime` stores the same six fields the chip keeps in its
//! timekeeping registers, with the year stored as an offset from 2000.
//! Conversions to and from 32-bit Unix time go through a linear day count
//! anchored at 2000-01-01 (day 0).
//!
//! Leap years are every fourth year starting with 2000. The 100/400 year rules
//! are not applied: no century boundary other than 2000 falls inside the
//! supported window, and extending the window past 2099 requires revisiting
//! `is_leap_year`.

use core::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Seconds between the Unix epoch and 2000-01-01T00:00:00
pub const SECONDS_FROM_1970_TO_2000: u32 = 946_684_800;

/// Seconds in one calendar day (no leap seconds)
pub const SECONDS_PER_DAY: u32 = 86_400;

// Last representable instant, 2099-12-31T23:59:59
const LAST_UNIX_TIME: u32 = 4_102_444_799;

// Month lengths in a common year
const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Reasons a date or time is rejected by the checked constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DateTimeError {
  /// Year is outside 2000..=2099
  YearOutOfRange,
  MonthOutOfRange,
  /// Day is zero or past the end of the month
  DayOutOfRange,
  /// Hour, minute or second is out of range
  TimeOutOfRange,
  /// Unix timestamp is before 2000 or after 2099
  TimestampOutOfRange,
}

impl fmt::Display for DateTimeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let msg = match self {
      DateTimeError::YearOutOfRange => "year must be within 2000..=2099",
      DateTimeError::MonthOutOfRange => "month must be within 1..=12",
      DateTimeError::DayOutOfRange => "day is not within the month",
      DateTimeError::TimeOutOfRange => "time of day out of range",
      DateTimeError::TimestampOutOfRange => "timestamp outside 2000..=2099",
    };
    f.write_str(msg)
  }
}

/// Leap year test for a year offset from 2000 (0 is 2000 itself)
pub const fn is_leap_year(year_offset: u8) -> bool {
  year_offset == 0 || year_offset % 4 == 0
}

/// Number of days in `month` (1..12) of the given year offset.
/// Returns 0 for a month outside 1..12.
pub fn days_in_month(year_offset: u8, month: u8) -> u8 {
  let days = usize::from(month)
    .checked_sub(1)
    .and_then(|idx| DAYS_IN_MONTH.get(idx))
    .copied()
    .unwrap_or(0);
  if month == 2 && is_leap_year(year_offset) {
    days + 1
  }
  else {
    days
  }
}

/// Last day of `month` in a full calendar `year` such as 2024.
/// The year is reduced modulo 2000, like `CalendarTime::new` does.
pub fn last_day_of_month(year: u16, month: u8) -> u8 {
  days_in_month((year % 2000) as u8, month)
}

// Leap days between 2000-01-01 and January 1st of the given year offset:
// one for 2000 itself, plus one per completed four year cycle.
fn leap_days_before(year_offset: u8) -> u16 {
  if year_offset == 0 {
    0
  }
  else {
    u16::from((year_offset - 1) / 4) + 1
  }
}

/// Number of days since 2000-01-01, where 2000-01-01 itself is day 0.
///
/// Valid for year offsets 0..=99. Out-of-range fields wrap rather than panic,
/// so the result is defined but meaningless for them.
pub fn days_since_2k(year_offset: u8, month: u8, day: u8) -> u16 {
  let mut days = u16::from(day).wrapping_sub(1);
  days = days
    .wrapping_add(365u16.wrapping_mul(u16::from(year_offset)))
    .wrapping_add(leap_days_before(year_offset));

  // whole months already passed this year
  let months_passed = usize::from(month.saturating_sub(1));
  for &len in DAYS_IN_MONTH.iter().take(months_passed) {
    days = days.wrapping_add(u16::from(len));
  }
  // February 29th already passed
  if month > 2 && is_leap_year(year_offset) {
    days = days.wrapping_add(1);
  }
  days
}

/// Date and time of day within 2000-01-01T00:00:00 ..= 2099-12-31T23:59:59.
///
/// No time zone, daylight saving or leap second handling.
/// Values built with [`CalendarTime::new`] are not validated; use
/// [`CalendarTime::try_new`] at trust boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalendarTime {
  // field order gives chronological ordering
  years_since_2000: u8,
  month: u8,
  day: u8,
  hour: u8,
  minute: u8,
  second: u8,
}

impl CalendarTime {
  /// The earliest supported instant, 2000-01-01T00:00:00
  pub const EPOCH_2000: CalendarTime = CalendarTime {
    years_since_2000: 0,
    month: 1,
    day: 1,
    hour: 0,
    minute: 0,
    second: 0,
  };

  /// Build from raw fields without validation.
  /// - `year` is reduced modulo 2000, so both `2023` and `23` mean 2023.
  /// - The other fields are stored as given.
  pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
    CalendarTime {
      years_since_2000: (year % 2000) as u8,
      month,
      day,
      hour,
      minute,
      second,
    }
  }

  /// Build from fields, rejecting anything outside the supported calendar.
  /// `year` may be given either as a full year (2000..=2099) or as an
  /// offset from 2000 (0..=99).
  pub fn try_new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8)
    -> Result<Self, DateTimeError> {
    let years_since_2000 = match year {
      0..=99 => year as u8,
      2000..=2099 => (year - 2000) as u8,
      _ => return Err(DateTimeError::YearOutOfRange),
    };
    CalendarTime { years_since_2000, month, day, hour, minute, second }.validated()
  }

  /// Decompose a Unix timestamp.
  ///
  /// Timestamps before 2000 wrap around and produce a meaningless (but
  /// defined) result; use [`CalendarTime::try_from_unix_time`] when the input
  /// is not already known to be in range.
  pub fn from_unix_time(unix_seconds: u32) -> Self {
    let mut t = unix_seconds.wrapping_sub(SECONDS_FROM_1970_TO_2000);
    let second = (t % 60) as u8;
    t /= 60;
    let minute = (t % 60) as u8;
    t /= 60;
    let hour = (t % 24) as u8;
    let mut days_left = t / 24;

    let mut years_since_2000 = 0u8;
    loop {
      let year_len = 365 + u32::from(is_leap_year(years_since_2000));
      if days_left < year_len {
        break;
      }
      days_left -= year_len;
      years_since_2000 += 1;
    }

    let mut month = 1u8;
    while month < 12 {
      let month_len = u32::from(days_in_month(years_since_2000, month));
      if days_left < month_len {
        break;
      }
      days_left -= month_len;
      month += 1;
    }

    CalendarTime {
      years_since_2000,
      month,
      day: (days_left + 1) as u8,
      hour,
      minute,
      second,
    }
  }

  /// Decompose a Unix timestamp, rejecting instants outside 2000..=2099
  pub fn try_from_unix_time(unix_seconds: u32) -> Result<Self, DateTimeError> {
    if (SECONDS_FROM_1970_TO_2000..=LAST_UNIX_TIME).contains(&unix_seconds) {
      Ok(Self::from_unix_time(unix_seconds))
    }
    else {
      Err(DateTimeError::TimestampOutOfRange)
    }
  }

  // Check every field against the supported calendar
  fn validated(self) -> Result<Self, DateTimeError> {
    if self.years_since_2000 > 99 {
      return Err(DateTimeError::YearOutOfRange);
    }
    if !(1..=12).contains(&self.month) {
      return Err(DateTimeError::MonthOutOfRange);
    }
    if self.day == 0 || self.day > days_in_month(self.years_since_2000, self.month) {
      return Err(DateTimeError::DayOutOfRange);
    }
    if self.hour > 23 || self.minute > 59 || self.second > 59 {
      return Err(DateTimeError::TimeOutOfRange);
    }
    Ok(self)
  }

  /// Whether all fields describe a real instant in 2000..=2099
  pub fn is_valid(&self) -> bool {
    self.validated().is_ok()
  }

  /// Full calendar year, e.g. 2023
  pub fn year(&self) -> u16 {
    2000 + u16::from(self.years_since_2000)
  }

  pub fn years_since_2000(&self) -> u8 {
    self.years_since_2000
  }

  pub fn month(&self) -> u8 {
    self.month
  }

  pub fn day(&self) -> u8 {
    self.day
  }

  pub fn hour(&self) -> u8 {
    self.hour
  }

  pub fn minute(&self) -> u8 {
    self.minute
  }

  pub fn second(&self) -> u8 {
    self.second
  }

  /// Days since 2000-01-01 (day 0)
  pub fn days_since_2000(&self) -> u16 {
    days_since_2k(self.years_since_2000, self.month, self.day)
  }

  /// Day of week, 0 = Sunday .. 6 = Saturday
  pub fn day_of_week(&self) -> u8 {
    // 2000-01-01 was a Saturday
    ((u32::from(self.days_since_2000()) + 6) % 7) as u8
  }

  /// Seconds since 1970-01-01T00:00:00Z
  pub fn to_unix_time(&self) -> u32 {
    u32::from(self.days_since_2000())
      .wrapping_mul(24)
      .wrapping_add(u32::from(self.hour))
      .wrapping_mul(60)
      .wrapping_add(u32::from(self.minute))
      .wrapping_mul(60)
      .wrapping_add(u32::from(self.second))
      .wrapping_add(SECONDS_FROM_1970_TO_2000)
  }
}

impl Default for CalendarTime {
  fn default() -> Self {
    Self::EPOCH_2000
  }
}

impl fmt::Display for CalendarTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
           self.year(), self.month, self.day, self.hour, self.minute, self.second)
  }
}

impl TryFrom<&NaiveDateTime> for CalendarTime {
  type Error = DateTimeError;

  /// Sub-second precision is dropped
  fn try_from(datetime: &NaiveDateTime) -> Result<Self, Self::Error> {
    let year = datetime.year();
    if !(2000..=2099).contains(&year) {
      return Err(DateTimeError::YearOutOfRange);
    }
    CalendarTime::try_new(
      year as u16,
      datetime.month() as u8,
      datetime.day() as u8,
      datetime.hour() as u8,
      datetime.minute() as u8,
      datetime.second() as u8,
    )
  }
}

impl TryFrom<CalendarTime> for NaiveDateTime {
  type Error = DateTimeError;

  fn try_from(time: CalendarTime) -> Result<Self, Self::Error> {
    let time = time.validated()?;
    NaiveDate::from_ymd_opt(i32::from(time.year()), u32::from(time.month), u32::from(time.day))
      .and_then(|date| {
        date.and_hms_opt(u32::from(time.hour), u32::from(time.minute), u32::from(time.second))
      })
      .ok_or(DateTimeError::DayOutOfRange)
  }
}
