extern crate ds1307_rtc;

use std::thread::sleep;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use linux_embedded_hal::I2cdev;
use ds1307_rtc::{CalendarTime, Ds1307, DateTimeAccess};

/// Example driving two DS1307 clocks that share one address,
/// each sitting on its own channel of an i2c mux (eg TCA9548A).
///
/// This example assumes:
/// - The host connecting to the RTCs is running a linux environment (such as Raspberry Pi)
/// - The mux is attached to i2c1

const MUX_I2C_ADDRESS: u8 = 0x70;
const MUX_CHAN_FIRST: u8 = 0b0000_0001; // channel 0, LSB
const MUX_CHAN_SECOND: u8 = 0b1000_0000; // channel 7, MSB

fn main() -> Result<()> {
  let i2c = I2cdev::new("/dev/i2c-1")?;
  let i2c_bus = shared_bus::BusManagerSimple::new(i2c);

  let mut rtc1 = Ds1307::new_with_mux(i2c_bus.acquire_i2c(), MUX_I2C_ADDRESS, MUX_CHAN_FIRST);
  let mut rtc2 = Ds1307::new_with_mux(i2c_bus.acquire_i2c(), MUX_I2C_ADDRESS, MUX_CHAN_SECOND);
  rtc1.begin()?;
  rtc2.begin()?;

  // set both through the chrono interface, so they start aligned
  let sys_dt = Utc::now().naive_utc();
  rtc1.set_datetime(&sys_dt).map_err(|e| anyhow::anyhow!("rtc1: {:?}", e))?;
  rtc2.set_datetime(&sys_dt).map_err(|e| anyhow::anyhow!("rtc2: {:?}", e))?;

  for _ in 0..5 {
    sleep(Duration::from_secs(1));
    let t1: CalendarTime = rtc1.now()?;
    let t2: CalendarTime = rtc2.now()?;
    let drift = i64::from(t2.to_unix_time()) - i64::from(t1.to_unix_time());
    println!("rtc1 {} rtc2 {} drift {}s", t1, t2, drift);
  }

  Ok(())
}
