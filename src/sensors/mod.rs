//! Sensor drivers.
//!
//! Every driver exposes the same two-step contract: [`Sensor::sample_fetch`]
//! performs the bus I/O and caches the result, [`Sensor::channel_get`]
//! returns a cached channel without touching the bus.  A channel that was
//! not refreshed by the last fetch reports [`SensorError::NoData`].
//!
//! | Driver       | Chip     | Channels                    | Settle           |
//! |--------------|----------|-----------------------------|------------------|
//! | `si7020`     | Si7020   | AmbientTemp, Humidity       | 25 ms RH convert |
//! | `tsl4531`    | TSL4531  | Light                       | 420 ms one-shot  |
//! | `bmp280`     | BMP280   | Pressure, DieTemp           | 20 ms forced     |
//! | `fuel_gauge` | ADC      | BatteryVoltage, StateOfCharge | none           |

pub mod bmp280;
pub mod fuel_gauge;
pub mod si7020;
pub mod tsl4531;

use crate::error::{Error, SensorError};

/// A logical channel a driver can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    /// Degrees Celsius.
    AmbientTemp,
    /// Percent relative humidity.
    Humidity,
    /// Lux.
    Light,
    /// Kilopascal.
    Pressure,
    /// Degrees Celsius, chip-internal.
    DieTemp,
    /// Volts.
    BatteryVoltage,
    /// Percent remaining capacity.
    StateOfCharge,
}

/// Fixed-point reading: `val1` integer part, `val2` millionths.
///
/// Both parts carry the same sign, so -1.5 is `{ val1: -1, val2: -500_000 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorValue {
    pub val1: i32,
    pub val2: i32,
}

impl SensorValue {
    pub const fn new(val1: i32, val2: i32) -> Self {
        Self { val1, val2 }
    }

    /// From hundredths (0.01 units).
    pub const fn from_centi(centi: i32) -> Self {
        Self {
            val1: centi / 100,
            val2: (centi % 100) * 10_000,
        }
    }

    /// From thousandths (0.001 units).
    pub const fn from_milli(milli: i64) -> Self {
        Self {
            val1: (milli / 1_000) as i32,
            val2: ((milli % 1_000) * 1_000) as i32,
        }
    }

    /// From millionths.
    pub const fn from_micro(micro: i64) -> Self {
        Self {
            val1: (micro / 1_000_000) as i32,
            val2: (micro % 1_000_000) as i32,
        }
    }

    /// Value scaled by 100, truncated toward zero.
    pub const fn to_centi(self) -> i64 {
        self.val1 as i64 * 100 + self.val2 as i64 / 10_000
    }

    /// Value scaled by 10 000, truncated toward zero.
    pub const fn to_ten_thousandths(self) -> i64 {
        self.val1 as i64 * 10_000 + self.val2 as i64 / 100
    }
}

/// Driver contract shared by every sensor.
pub trait Sensor {
    /// Logical device name used in logs and binding errors.
    fn name(&self) -> &'static str;

    /// Verify the chip answers and configure it.  Called once at binding.
    fn probe(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Perform the bus I/O for a new sample and cache it.
    fn sample_fetch(&mut self) -> Result<(), SensorError>;

    /// Return a cached channel value.
    fn channel_get(&self, channel: SensorChannel) -> Result<SensorValue, SensorError>;
}

/// Resolve a driver handle: probe the chip and hand it back ready to use.
pub fn bind<S: Sensor>(mut sensor: S) -> Result<S, Error> {
    match sensor.probe() {
        Ok(()) => {
            log::info!("{}: bound", sensor.name());
            Ok(sensor)
        }
        Err(e) => {
            log::error!("{}: binding failed ({})", sensor.name(), e);
            Err(Error::DeviceBinding(sensor.name()))
        }
    }
}
