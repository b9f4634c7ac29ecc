extern crate ds1307_rtc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use linux_embedded_hal::I2cdev;
use ds1307_rtc::{CalendarTime, Ds1307};

/// Example setting a DS1307 from the host clock and reading it back.
///  Assumptions:
///  - The host this example runs on behaves like a Raspberry Pi 3+ running linux
///  - The device is attached to i2c1 on the host
///
/// The following was tested by enabling i2c-1 on a Raspberry Pi 3+
///  using `sudo raspi-config`
///  and connecting the SDA, SCL, GND, and 5V pins from RPi to the RTC module

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

fn main() -> Result<()> {
  // Initialize the I2C bus (device)
  let i2c_bus = I2cdev::new("/dev/i2c-1")?;

  let mut rtc = Ds1307::new(i2c_bus);
  rtc.begin()?;

  if !rtc.is_running()? {
    println!("oscillator halted, the stored time is stale");
  }
  println!("rtc before: {}", rtc.now()?);

  let sys_dt = Utc::now().naive_utc();
  let sys_time = CalendarTime::try_from(&sys_dt)
    .map_err(|e| anyhow!("host clock {} not usable: {}", sys_dt, e))?;
  rtc.set(&sys_time)?;

  let now = rtc.now()?;
  println!("sys  {} ({})", sys_time, sys_time.to_unix_time());
  println!("rtc  {} ({}) {}", now, now.to_unix_time(),
           WEEKDAYS[usize::from(now.day_of_week())]);
  println!("running: {}", rtc.is_running()?);

  Ok(())
}
