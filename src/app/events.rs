//! Outbound measurement events.
//!
//! Channel work handlers emit these through the
//! [`MeasurementSink`](super::ports::MeasurementSink) port.  Values stay in
//! the driver representation; the GATT server converts them to
//! characteristic units.

use crate::config::ConfigKey;
use crate::sensors::SensorValue;

/// One of the four quantities exposed by the Environmental Sensing Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temperature,
    Humidity,
    AmbientLight,
    Pressure,
}

impl Quantity {
    pub const ALL: [Self; 4] = [
        Self::Temperature,
        Self::Humidity,
        Self::AmbientLight,
        Self::Pressure,
    ];

    /// Storage key of this quantity's persisted configuration.
    pub const fn config_key(self) -> ConfigKey {
        match self {
            Self::Temperature => ConfigKey::Temperature,
            Self::Humidity => ConfigKey::Humidity,
            Self::AmbientLight => ConfigKey::AmbientLight,
            Self::Pressure => ConfigKey::Pressure,
        }
    }
}

/// A completed measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Combined Si7020 reading.  `None` means that channel failed this
    /// period; the other one is still reported.
    TempHumidity {
        /// Degrees Celsius.
        temperature: Option<SensorValue>,
        /// Percent relative humidity.
        humidity: Option<SensorValue>,
    },
    /// Lux.
    AmbientLight(SensorValue),
    /// Kilopascal.
    Pressure(SensorValue),
    /// Remaining capacity, 0–100 %.
    Battery(u8),
}
