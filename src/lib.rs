#![cfg_attr(not(test), no_std)]

pub use rtcc::{
  DateTimeAccess, NaiveDate, NaiveDateTime, Datelike, Timelike,
};

mod datetime;
mod soft_clock;

pub use datetime::{
  CalendarTime, DateTimeError,
  days_in_month, days_since_2k, is_leap_year, last_day_of_month,
  SECONDS_FROM_1970_TO_2000, SECONDS_PER_DAY,
};
pub use soft_clock::{Millis, SoftRtc};

use embedded_hal::blocking::i2c::{Write, Read, WriteRead};

// Fixed i2c bus address of the device (7-bit)
const DS1307_ADDRESS: u8 = 0x68;

// Register addresses

// Holds the Clock Halt (CH) bit and the seconds,
// in two binary coded decimal (BCD) digits.
// Values will range from 00 to 59.
const REG_SECONDS: u8 = 0x00;
const REG_MINUTES: u8 = 0x01;

// Bit 6 selects 12 hour mode; this driver only uses 24 hour mode,
// where values range from 00 to 23.
const REG_HOURS: u8 = 0x02;

// Day of the week counter, 1..7. The chip only increments it at midnight,
// the mapping of values to days is up to the user.
// We store Sunday as 1 .. Saturday as 7.
const REG_WEEKDAY: u8 = 0x03;

// Holds the current day of the month, in two BCD digits.
// Values will range from 01 to 31.
const REG_DATE: u8 = 0x04;

// Holds the current month, in two BCD digits.
// Values will range from 01 to 12.
const REG_MONTH: u8 = 0x05;

// Holds the year within the century, 00 to 99
const REG_YEAR: u8 = 0x06;

// Square wave output control: OUT, SQWE, RS1, RS0
// const REG_CONTROL: u8 = 0x07;

// Number of timekeeping registers read or written in one burst
const TIMEKEEPING_REG_COUNT: usize = 7;

// REG_SECONDS bits:
const CLOCK_HALT_BIT: u8 = 1 << 7; // CH bit
const SECONDS_MASK: u8 = !CLOCK_HALT_BIT;

// REG_HOURS bits:
const HOURS_24_MASK: u8 = 0x3F;

/// Errors from the `DateTimeAccess` interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
  /// I2C bus error
  I2c(E),
  /// The clock registers (or the requested datetime) don't hold
  /// a valid date within 2000..2099
  InvalidDateTime(DateTimeError),
}

/// The timekeeping registers of the chip decoded from BCD,
/// with no calendar interpretation applied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawFields {
  pub second: u8,
  pub minute: u8,
  pub hour: u8,
  pub day: u8,
  pub month: u8,
  /// Year within the century, 0..99 for 2000..2099
  pub year: u8,
  /// Weekday register value as stored on the chip (1..7)
  pub weekday: u8,
  /// False when the Clock Halt bit is set, ie the oscillator is stopped
  pub oscillator_running: bool,
}

impl From<&CalendarTime> for RawFields {
  fn from(time: &CalendarTime) -> Self {
    RawFields {
      second: time.second(),
      minute: time.minute(),
      hour: time.hour(),
      day: time.day(),
      month: time.month(),
      year: time.years_since_2000(),
      weekday: time.day_of_week() + 1,
      oscillator_running: true,
    }
  }
}

impl From<&RawFields> for CalendarTime {
  fn from(raw: &RawFields) -> Self {
    CalendarTime::new(raw.year.into(), raw.month, raw.day, raw.hour, raw.minute, raw.second)
  }
}

/// DS1307 (and pin compatible) 64 x 8, Serial, I2C Real-Time Clock
/// rust no_std driver (utilizes the embedded_hal i2c interface)
pub struct Ds1307<I2C> {
  i2c: I2C,
  mux_addr: u8,
  mux_chan: u8,
}

impl<I2C, E> Ds1307<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{

  /// New driver instance, assumes that there is no i2c mux
  /// sitting between the RTC and the host.
  pub fn new(i2c: I2C) -> Self {
    Ds1307 {
      i2c,
      mux_addr: 0u8,
      mux_chan: 0u8
    }
  }

  /// Allows the caller to create a new driver instance with
  /// an i2c mux between the RTC and the host.
  /// - `mux_addr` : the i2c address of the mux itself
  /// - `mux_chan` : the mux channel assigned to the RTC
  pub fn new_with_mux(i2c: I2C, mux_addr: u8, mux_chan: u8) -> Self {
    Ds1307 {
      i2c,
      mux_addr,
      mux_chan
    }
  }

  /// Give back the i2c bus
  pub fn release(self) -> I2C {
    self.i2c
  }

  // Converts a binary value to BCD format
  fn bin_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
  }

  // Converts a BCD value to binary format
  fn bcd_to_bin(value: u8) -> u8 {
    ((value & 0xF0) >> 4) * 10 + (value & 0x0F)
  }

  // If using an i2c mux, tell the mux to select our channel
  fn select_mux_channel(&mut self) -> Result<(), E> {
    if self.mux_addr != 0u8 {
      self.i2c.write(self.mux_addr, &[self.mux_chan])
    }
    else {
      Ok(())
    }
  }

  fn write_register(&mut self, reg: u8, data: u8) -> Result<(), E> {
    self.select_mux_channel()?;
    self.i2c.write(DS1307_ADDRESS, &[reg, data])
  }

  fn read_register(&mut self, reg: u8) -> Result<u8, E> {
    self.select_mux_channel()?;
    let mut buf = [0];
    self.i2c.write_read(DS1307_ADDRESS, &[reg], &mut buf)?;
    Ok(buf[0])
  }

  // read a block of registers all at once
  fn read_multi_registers(&mut self, reg: u8, read_buf: &mut [u8]) -> Result<(), E> {
    self.select_mux_channel()?;
    self.i2c.write_read(DS1307_ADDRESS, &[reg], read_buf)
  }

  // set specific bits in a register:
  // all bits must be high that you wish to set
  fn set_reg_bits(&mut self, reg: u8, bits: u8) -> Result<(), E> {
    let reg_val = self.read_register(reg)?;
    self.write_register(reg, reg_val | bits)
  }

  // clear specific bits in a register:
  // all bits must be high that you wish to be cleared
  fn clear_reg_bits(&mut self, reg: u8, bits: u8) -> Result<(), E> {
    let reg_val = self.read_register(reg)?;
    self.write_register(reg, reg_val & !bits)
  }

  // If `set` is true, set the high bits given in `bits`, otherwise clear those bits
  fn set_or_clear_reg_bits(&mut self, reg: u8, bits: u8, set: bool) -> Result<(), E> {
    if set {
      self.set_reg_bits(reg, bits)
    }
    else {
      self.clear_reg_bits(reg, bits)
    }
  }

  /// Check that the device answers on the bus.
  /// Selects the mux channel (if any) and reads the seconds register once.
  pub fn begin(&mut self) -> Result<(), E> {
    self.read_register(REG_SECONDS)?;
    log::debug!("ds1307 found at 0x{:02x}", DS1307_ADDRESS);
    Ok(())
  }

  /// Whether the oscillator is running (the Clock Halt bit is clear).
  /// A fresh chip, or one that lost backup power, powers up halted
  /// and keeps a stale time until it is set.
  pub fn is_running(&mut self) -> Result<bool, E> {
    let seconds = self.read_register(REG_SECONDS)?;
    Ok(0 == (seconds & CLOCK_HALT_BIT))
  }

  /// Start or stop the oscillator without touching the time registers
  pub fn toggle_oscillator(&mut self, enable: bool) -> Result<(), E> {
    // CH set means halted
    self.set_or_clear_reg_bits(REG_SECONDS, CLOCK_HALT_BIT, !enable)
  }

  /// Read all timekeeping registers in one burst and decode them from BCD.
  /// Reading in a single transaction avoids tearing across a rollover,
  /// since the chip latches its counters at the start of the read.
  pub fn read_raw_fields(&mut self) -> Result<RawFields, E> {
    let mut read_buf = [0u8; TIMEKEEPING_REG_COUNT];
    self.read_multi_registers(REG_SECONDS, &mut read_buf)?;

    let raw_seconds = read_buf[REG_SECONDS as usize];
    Ok(RawFields {
      second: Self::bcd_to_bin(raw_seconds & SECONDS_MASK),
      minute: Self::bcd_to_bin(read_buf[REG_MINUTES as usize]),
      hour: Self::bcd_to_bin(read_buf[REG_HOURS as usize] & HOURS_24_MASK),
      weekday: Self::bcd_to_bin(read_buf[REG_WEEKDAY as usize]),
      day: Self::bcd_to_bin(read_buf[REG_DATE as usize]),
      month: Self::bcd_to_bin(read_buf[REG_MONTH as usize]),
      year: Self::bcd_to_bin(read_buf[REG_YEAR as usize]),
      oscillator_running: 0 == (raw_seconds & CLOCK_HALT_BIT),
    })
  }

  /// Encode the fields to BCD and write all timekeeping registers
  /// plus the control register in one burst.
  /// - The Clock Halt bit is taken from `oscillator_running`
  /// - The control register is cleared (square wave output off)
  pub fn write_raw_fields(&mut self, raw: &RawFields) -> Result<(), E> {
    let halt = if raw.oscillator_running { 0 } else { CLOCK_HALT_BIT };
    self.select_mux_channel()?;
    self.i2c.write(DS1307_ADDRESS, &[
      REG_SECONDS,
      Self::bin_to_bcd(raw.second) | halt,
      Self::bin_to_bcd(raw.minute),
      Self::bin_to_bcd(raw.hour),
      Self::bin_to_bcd(raw.weekday),
      Self::bin_to_bcd(raw.day),
      Self::bin_to_bcd(raw.month),
      Self::bin_to_bcd(raw.year),
      0u8,
    ])
  }

  /// Read the current date and time.
  /// The result is not validated: a chip holding garbage yields a
  /// garbage `CalendarTime`. Check `is_running` once after power-up
  /// before trusting this.
  pub fn now(&mut self) -> Result<CalendarTime, E> {
    let raw = self.read_raw_fields()?;
    if !raw.oscillator_running {
      log::warn!("ds1307 oscillator halted, time is stale");
    }
    Ok(CalendarTime::from(&raw))
  }

  /// Set the date and time. This also starts the oscillator if it was halted,
  /// and writes the matching weekday register.
  pub fn set(&mut self, time: &CalendarTime) -> Result<(), E> {
    log::debug!("ds1307 set {}", time);
    self.write_raw_fields(&RawFields::from(time))
  }

  /// Set time of day (hours, minutes, seconds) in binary format.
  /// Note that writing the seconds register clears the Clock Halt bit.
  pub fn set_time(&mut self, hours: u8, minutes: u8, seconds: u8) -> Result<(), E> {
    self.write_register(REG_HOURS, Self::bin_to_bcd(hours))?;
    self.write_register(REG_MINUTES, Self::bin_to_bcd(minutes))?;
    self.write_register(REG_SECONDS, Self::bin_to_bcd(seconds))
  }

  /// Get time of day in binary format (hours, minutes, seconds)
  pub fn get_time(&mut self) -> Result<(u8, u8, u8), E> {
    let hours = Self::bcd_to_bin(self.read_register(REG_HOURS)? & HOURS_24_MASK);
    let minutes = Self::bcd_to_bin(self.read_register(REG_MINUTES)?);
    let seconds = Self::bcd_to_bin(self.read_register(REG_SECONDS)? & SECONDS_MASK);
    Ok((hours, minutes, seconds))
  }

  /// Set the calendar year, month, day. Year is 0..99  (for 2000 to 2099)
  pub fn set_year_month_day(&mut self, year: u8, month: u8, day: u8) -> Result<(), E> {
    self.write_register(REG_YEAR, Self::bin_to_bcd(year))?;
    self.write_register(REG_MONTH, Self::bin_to_bcd(month))?;
    self.write_register(REG_DATE, Self::bin_to_bcd(day))
  }

  /// Get the calendar year (0..99), month (1..12), day (1..31)
  pub fn get_year_month_day(&mut self) -> Result<(u8, u8, u8), E> {
    let year = Self::bcd_to_bin(self.read_register(REG_YEAR)?);
    let month = Self::bcd_to_bin(self.read_register(REG_MONTH)?);
    let day = Self::bcd_to_bin(self.read_register(REG_DATE)?);
    Ok((year, month, day))
  }

}

impl<I2C, E> DateTimeAccess for Ds1307<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  type Error = Error<E>;

  /// Fails with `InvalidDateTime` if the registers don't hold a real date,
  /// eg on a chip that has never been set.
  fn datetime(&mut self) -> Result<NaiveDateTime, Self::Error> {
    let now = self.now().map_err(Error::I2c)?;
    NaiveDateTime::try_from(now).map_err(Error::InvalidDateTime)
  }

  /// Only datetimes from 2000 through 2099 are accepted;
  /// sub-second precision is dropped.
  fn set_datetime(&mut self, datetime: &NaiveDateTime) -> Result<(), Self::Error> {
    let time = CalendarTime::try_from(datetime).map_err(Error::InvalidDateTime)?;
    self.set(&time).map_err(Error::I2c)
  }

}

#[cfg(test)]
mod tests {
  use super::*;
  use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTrans};
  use std::vec;

  const MUX_ADDRESS: u8 = 0x70;
  const MUX_CHAN: u8 = 0b0000_0100;

  fn bcd(value: u8) -> u8 {
    Ds1307::<I2cMock>::bin_to_bcd(value)
  }

  // 2023-06-15 12:30:45, a Thursday
  fn sample_registers() -> vec::Vec<u8> {
    vec![0x45, 0x30, 0x12, 0x05, 0x15, 0x06, 0x23]
  }

  #[test]
  fn test_bcd_conversion() {
    for value in 0..100u8 {
      assert_eq!(Ds1307::<I2cMock>::bcd_to_bin(bcd(value)), value);
    }
    assert_eq!(bcd(59), 0x59);
    assert_eq!(Ds1307::<I2cMock>::bcd_to_bin(0x31), 31);
  }

  #[test]
  fn test_begin() {
    let expectations = [
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], vec![0x00]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.begin().unwrap();
    mock.done();
  }

  #[test]
  fn test_is_running() {
    let expectations = [
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], vec![0x12]),
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], vec![CLOCK_HALT_BIT | 0x12]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    assert!(rtc.is_running().unwrap());
    assert!(!rtc.is_running().unwrap());
    mock.done();
  }

  #[test]
  fn test_toggle_oscillator() {
    let expectations = [
      // halt: set CH, preserving the seconds
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], vec![0x42]),
      I2cTrans::write(DS1307_ADDRESS, vec![REG_SECONDS, CLOCK_HALT_BIT | 0x42]),
      // start: clear CH
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], vec![CLOCK_HALT_BIT | 0x42]),
      I2cTrans::write(DS1307_ADDRESS, vec![REG_SECONDS, 0x42]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.toggle_oscillator(false).unwrap();
    rtc.toggle_oscillator(true).unwrap();
    mock.done();
  }

  #[test]
  fn test_read_raw_fields() {
    let mut regs = sample_registers();
    regs[0] |= CLOCK_HALT_BIT;
    let expectations = [
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], regs),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    let raw = rtc.read_raw_fields().unwrap();
    assert_eq!(raw, RawFields {
      second: 45,
      minute: 30,
      hour: 12,
      day: 15,
      month: 6,
      year: 23,
      weekday: 5,
      oscillator_running: false,
    });
    mock.done();
  }

  #[test]
  fn test_now() {
    let expectations = [
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], sample_registers()),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    let now = rtc.now().unwrap();
    assert_eq!(now, CalendarTime::new(2023, 6, 15, 12, 30, 45));
    assert_eq!(now.to_unix_time(), 1_686_832_245);
    mock.done();
  }

  #[test]
  fn test_set() {
    // Thursday is weekday 4, stored as 5
    let mut expected = vec![REG_SECONDS];
    expected.extend_from_slice(&sample_registers());
    expected.push(0x00);
    let expectations = [
      I2cTrans::write(DS1307_ADDRESS, expected),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.set(&CalendarTime::new(2023, 6, 15, 12, 30, 45)).unwrap();
    mock.done();
  }

  #[test]
  fn test_write_raw_fields_halted() {
    let raw = RawFields {
      second: 7,
      minute: 8,
      hour: 23,
      day: 31,
      month: 12,
      year: 99,
      weekday: 5,
      oscillator_running: false,
    };
    let expectations = [
      I2cTrans::write(DS1307_ADDRESS,
                      vec![REG_SECONDS, CLOCK_HALT_BIT | 0x07, 0x08, 0x23, 0x05, 0x31, 0x12, 0x99, 0x00]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.write_raw_fields(&raw).unwrap();
    mock.done();
  }

  #[test]
  fn test_set_time() {
    let expectations = [
      I2cTrans::write(DS1307_ADDRESS, vec![REG_HOURS, bcd(23)]),
      I2cTrans::write(DS1307_ADDRESS, vec![REG_MINUTES, bcd(59)]),
      I2cTrans::write(DS1307_ADDRESS, vec![REG_SECONDS, bcd(58)]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.set_time(23, 59, 58).unwrap();
    mock.done();
  }

  #[test]
  fn test_get_time() {
    let expectations = [
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_HOURS], vec![bcd(23)]),
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_MINUTES], vec![bcd(59)]),
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], vec![CLOCK_HALT_BIT | bcd(58)]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    let (hours, minutes, seconds) = rtc.get_time().unwrap();
    assert_eq!(hours, 23);
    assert_eq!(minutes, 59);
    assert_eq!(seconds, 58);
    mock.done();
  }

  #[test]
  fn test_set_year_month_day() {
    let expectations = [
      I2cTrans::write(DS1307_ADDRESS, vec![REG_YEAR, bcd(23)]),
      I2cTrans::write(DS1307_ADDRESS, vec![REG_MONTH, bcd(12)]),
      I2cTrans::write(DS1307_ADDRESS, vec![REG_DATE, bcd(31)]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.set_year_month_day(23, 12, 31).unwrap();
    mock.done();
  }

  #[test]
  fn test_get_year_month_day() {
    let expectations = [
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_YEAR], vec![bcd(99)]),
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_MONTH], vec![bcd(2)]),
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_DATE], vec![bcd(28)]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    assert_eq!(rtc.get_year_month_day().unwrap(), (99, 2, 28));
    mock.done();
  }

  #[test]
  fn test_mux_channel_selected_first() {
    let expectations = [
      I2cTrans::write(MUX_ADDRESS, vec![MUX_CHAN]),
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], sample_registers()),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new_with_mux(mock.clone(), MUX_ADDRESS, MUX_CHAN);
    assert_eq!(rtc.now().unwrap(), CalendarTime::new(2023, 6, 15, 12, 30, 45));
    mock.done();
  }

  #[test]
  fn test_datetime_access() {
    let mut expected_write = vec![REG_SECONDS];
    expected_write.extend_from_slice(&sample_registers());
    expected_write.push(0x00);
    let expectations = [
      I2cTrans::write(DS1307_ADDRESS, expected_write),
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS], sample_registers()),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());

    let dt = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap().and_hms_opt(12, 30, 45).unwrap();
    rtc.set_datetime(&dt).unwrap();
    assert_eq!(rtc.datetime().unwrap(), dt);
    mock.done();
  }

  #[test]
  fn test_datetime_access_rejects_out_of_range() {
    // no bus traffic expected
    let mut mock = I2cMock::new(&[]);
    let mut rtc = Ds1307::new(mock.clone());
    let dt = NaiveDate::from_ymd_opt(2100, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    assert_eq!(rtc.set_datetime(&dt),
               Err(Error::InvalidDateTime(DateTimeError::YearOutOfRange)));
    mock.done();
  }

  #[test]
  fn test_datetime_access_garbage_registers() {
    // month 0x13 is not a valid BCD month
    let expectations = [
      I2cTrans::write_read(DS1307_ADDRESS, vec![REG_SECONDS],
                           vec![0x00, 0x00, 0x00, 0x01, 0x01, 0x13, 0x00]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    assert_eq!(rtc.datetime(),
               Err(Error::InvalidDateTime(DateTimeError::MonthOutOfRange)));
    mock.done();
  }

  #[cfg(feature = "defmt")]
  #[test]
  fn test_errors_are_defmt_format() {
    fn assert_format<T: defmt::Format>() {}
    assert_format::<Error<u8>>();
    assert_format::<DateTimeError>();
    assert_format::<CalendarTime>();
  }

  #[test]
  fn test_release() {
    let mut mock = I2cMock::new(&[]);
    let rtc = Ds1307::new(mock.clone());
    let mut bus = rtc.release();
    bus.done();
    mock.done();
  }
}
