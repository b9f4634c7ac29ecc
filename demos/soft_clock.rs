extern crate ds1307_rtc;

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::Result;
use linux_embedded_hal::I2cdev;
use ds1307_rtc::{Ds1307, SoftRtc};

/// Example running a software clock off the host's monotonic clock,
/// disciplined once from a DS1307 and then compared against it.
///
/// This example assumes:
/// - The host connecting to the RTC is running a linux environment (such as Raspberry Pi)
/// - The RTC is attached to i2c1 and has already been set (see `set_clock`)

fn main() -> Result<()> {
  let i2c = I2cdev::new("/dev/i2c-1")?;
  let mut rtc = Ds1307::new(i2c);
  rtc.begin()?;
  if !rtc.is_running()? {
    println!("rtc is halted, run the set_clock example first");
    return Ok(());
  }

  let start = Instant::now();
  let mut soft = SoftRtc::new(|| start.elapsed().as_millis() as u32);
  soft.adjust(&rtc.now()?);

  for _ in 0..10 {
    sleep(Duration::from_millis(1500));
    let hard = rtc.now()?;
    let local = soft.now();
    println!("rtc {} soft {} diff {}s", hard, local,
             i64::from(local.to_unix_time()) - i64::from(hard.to_unix_time()));
  }

  Ok(())
}
