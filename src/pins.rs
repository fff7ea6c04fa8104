//! GPIO / peripheral pin assignments for the EnvNode board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers or bus addresses.

// ---------------------------------------------------------------------------
// Sensor rail (I²C bus + switched supply)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
/// I²C bus clock.  All three sensors support fast mode.
pub const I2C_FREQ_HZ: u32 = 400_000;

/// Digital output: HIGH powers the shared sensor rail.
pub const SENSOR_POWER_GPIO: i32 = 25;

// ---------------------------------------------------------------------------
// Battery voltage (ADC1)
// ---------------------------------------------------------------------------

/// Battery voltage divider tap.  ADC1 channel 6 (GPIO 34 on ESP32).
pub const VBAT_ADC_GPIO: i32 = 34;
pub const VBAT_ADC_CHANNEL: u32 = 6;

// ---------------------------------------------------------------------------
// I²C addresses
// ---------------------------------------------------------------------------

/// Si7020 temperature / humidity sensor.
pub const SI7020_ADDR: u8 = 0x40;
/// TSL4531 ambient light sensor.
pub const TSL4531_ADDR: u8 = 0x29;
/// BMP280 barometric pressure sensor (SDO tied low).
pub const BMP280_ADDR: u8 = 0x76;
