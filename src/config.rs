//! System configuration parameters.
//!
//! Two layers:
//!
//! - **Compile-time constants**: timer delays, settle times, the bus permit
//!   timeout, valid ranges and names.  These never change at runtime.
//! - **Persisted records**: one [`SensorConfig`] per measured quantity plus a
//!   single [`DeviceConfig`], stored by [`ConfigStore`](crate::app::config_store::ConfigStore)
//!   under a [`ConfigKey`].  Created with defaults on first boot and only
//!   changed through explicit set operations afterwards.
//!
//! ## Record layout
//!
//! ```text
//! sensor record (12 bytes)                       device record (5 bytes)
//! ┌─────┬──────┬──────────┬──────────┬─────┬─────┐ ┌─────┬──────────┐
//! │ ver │ func │ period   │ interval │ app │ unc │ │ ver │ adv_int  │
//! │ u8  │ u8   │ u32 LE   │ u32 LE   │ u8  │ u8  │ │ u8  │ u32 LE   │
//! └─────┴──────┴──────────┴──────────┴─────┴─────┘ └─────┴──────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Delay before the first temperature/humidity measurement.
pub const TEMP_HUMIDITY_INITIAL_DELAY_MS: u64 = 5_000;
/// Delay before the first ambient-light measurement.
pub const AMBIENT_LIGHT_INITIAL_DELAY_MS: u64 = 1_000;
/// Delay before the first pressure measurement.
pub const PRESSURE_INITIAL_DELAY_MS: u64 = 1_000;
/// Delay before the first fuel-gauge sample.
pub const FUEL_GAUGE_INITIAL_DELAY_MS: u64 = 5_000;
/// Fuel-gauge sampling period.  Not persisted.
pub const FUEL_GAUGE_PERIOD_MS: u64 = 120_000;

/// Time the sensor rail needs after power-enable before the bus is usable.
pub const BUS_SETTLE_MS: u32 = 1;
/// Upper bound on waiting for the bus permit.
pub const BUS_PERMIT_TIMEOUT_MS: u32 = 50;
/// Maximum outstanding holders of the sensor rail.
pub const BUS_MAX_PERMITS: usize = 1;

/// Idle sleep of the main loop between timer polls.
pub const MAIN_LOOP_IDLE_MS: u32 = 100;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Complete local name in the advertising payload.
pub const DEVICE_NAME: &str = "EnvNode";

/// Software revision reported by the Device Information Service.
pub const SOFTWARE_REVISION: &str = env!("CARGO_PKG_VERSION");

/// Hardware revision reported by the Device Information Service.
pub const HARDWARE_REVISION: &str = match option_env!("ENVNODE_BOARD") {
    Some(board) => board,
    None => "esp32-envnode",
};

// ---------------------------------------------------------------------------
// Valid ranges (characteristic units)
// ---------------------------------------------------------------------------

/// Temperature, 0.01 °C.
pub const TEMPERATURE_RANGE: (i16, i16) = (-4_000, 8_500);
/// Relative humidity, 0.01 %.
pub const HUMIDITY_RANGE: (u16, u16) = (0, 10_000);
/// Illuminance, lux.
pub const AMBIENT_LIGHT_RANGE: (u16, u16) = (0, u16::MAX);
/// Pressure, 0.1 Pa.
pub const PRESSURE_RANGE: (u32, u32) = (300_000, 1_100_000);

// ---------------------------------------------------------------------------
// Record keys
// ---------------------------------------------------------------------------

/// Storage key of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ConfigKey {
    Device = 0,
    Temperature = 1,
    Humidity = 2,
    AmbientLight = 3,
    Pressure = 4,
}

impl ConfigKey {
    pub const fn id(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::AmbientLight => "ambient-light",
            Self::Pressure => "pressure",
        }
    }
}

// ---------------------------------------------------------------------------
// ES measurement enumerations
// ---------------------------------------------------------------------------

/// Sampling function field of the ES measurement descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SamplingFunction {
    Unspecified = 0x00,
    Instantaneous = 0x01,
    ArithmeticMean = 0x02,
    Rms = 0x03,
    Maximum = 0x04,
    Minimum = 0x05,
    Accumulated = 0x06,
    Count = 0x07,
}

impl SamplingFunction {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Unspecified,
            0x01 => Self::Instantaneous,
            0x02 => Self::ArithmeticMean,
            0x03 => Self::Rms,
            0x04 => Self::Maximum,
            0x05 => Self::Minimum,
            0x06 => Self::Accumulated,
            0x07 => Self::Count,
            _ => return None,
        })
    }
}

/// Application field of the ES measurement descriptor.
///
/// Only the codes this node uses get a variant; any assigned code up to
/// [`Application::MAX_CODE`] is accepted in a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Application {
    Unspecified = 0x00,
    Air = 0x01,
    Water = 0x02,
    Barometric = 0x03,
    Outdoor = 0x13,
    Indoor = 0x14,
}

impl Application {
    /// Highest assigned application code (Solar).
    pub const MAX_CODE: u8 = 0x21;
}

/// Measurement period value meaning "not in use".
pub const MEAS_PERIOD_NOT_IN_USE: u32 = 0;

/// Largest value a 24-bit descriptor field can carry.
pub const U24_MAX: u32 = 0x00FF_FFFF;

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// Format version prefixed to every stored record.
pub const RECORD_VERSION: u8 = 1;

/// Per-quantity measurement configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// [`SamplingFunction`] code.
    pub sampling_function: u8,
    /// Measurement period in seconds (24-bit on the wire).
    #[serde(with = "postcard::fixint::le")]
    pub measurement_period: u32,
    /// Update interval in seconds; also the timer period.
    #[serde(with = "postcard::fixint::le")]
    pub update_interval: u32,
    /// [`Application`] code.
    pub application: u8,
    /// Measurement uncertainty, 0.5 % steps.
    pub uncertainty: u8,
}

impl SensorConfig {
    /// Encoded size including the version byte.
    pub const RECORD_LEN: usize = 12;

    /// Default record used to seed a quantity on first boot.
    pub const fn default_for(key: ConfigKey) -> Self {
        let application = match key {
            ConfigKey::Pressure => Application::Barometric,
            _ => Application::Air,
        };
        Self {
            sampling_function: SamplingFunction::Instantaneous as u8,
            measurement_period: MEAS_PERIOD_NOT_IN_USE,
            update_interval: 60,
            application: application as u8,
            uncertainty: 0,
        }
    }

    /// Update interval as a timer period.
    pub fn update_interval_ms(&self) -> u64 {
        u64::from(self.update_interval) * 1_000
    }

    pub fn sampling(&self) -> Option<SamplingFunction> {
        SamplingFunction::from_code(self.sampling_function)
    }

    /// Range-check every field.  Invalid records are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling().is_none() {
            return Err(ConfigError::ValidationFailed(
                "sampling_function must be 0x00–0x07",
            ));
        }
        if self.measurement_period > U24_MAX {
            return Err(ConfigError::ValidationFailed(
                "measurement_period must fit in 24 bits",
            ));
        }
        if !(1..=U24_MAX).contains(&self.update_interval) {
            return Err(ConfigError::ValidationFailed(
                "update_interval must be 1–16777215 s",
            ));
        }
        if self.application > Application::MAX_CODE {
            return Err(ConfigError::ValidationFailed(
                "application must be 0x00–0x21",
            ));
        }
        Ok(())
    }
}

/// Device-wide configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Advertising interval in 0.625 ms units.
    #[serde(with = "postcard::fixint::le")]
    pub advertising_interval: u32,
}

impl DeviceConfig {
    /// Encoded size including the version byte.
    pub const RECORD_LEN: usize = 5;

    /// Advertising interval bounds accepted by the controller (20 ms – 10.24 s).
    pub const ADV_INTERVAL_RANGE: (u32, u32) = (0x0020, 0x4000);

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = Self::ADV_INTERVAL_RANGE;
        if !(min..=max).contains(&self.advertising_interval) {
            return Err(ConfigError::ValidationFailed(
                "advertising_interval must be 0x0020–0x4000",
            ));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        // 1600 × 0.625 ms = 1 s, the slow connectable advertising interval.
        Self {
            advertising_interval: 1_600,
        }
    }
}
