//! Log tap for the measurement stream.
//!
//! Wraps any [`MeasurementSink`] and writes each completed measurement to
//! the ESP-IDF logger (UART / USB-CDC in production) before forwarding it.

use core::fmt;

use log::info;

use crate::app::events::Measurement;
use crate::app::ports::MeasurementSink;
use crate::sensors::SensorValue;

/// Decorator that logs every [`Measurement`] and passes it on.
pub struct LogTap<'a, S: MeasurementSink + ?Sized> {
    inner: &'a mut S,
}

impl<'a, S: MeasurementSink + ?Sized> LogTap<'a, S> {
    pub fn new(inner: &'a mut S) -> Self {
        Self { inner }
    }
}

impl<S: MeasurementSink + ?Sized> MeasurementSink for LogTap<'_, S> {
    fn on_measurement(&mut self, measurement: &Measurement) {
        match measurement {
            Measurement::TempHumidity {
                temperature,
                humidity,
            } => {
                info!(
                    "MEAS | T={}\u{00b0}C | RH={}%",
                    Reading(*temperature),
                    Reading(*humidity)
                );
            }
            Measurement::AmbientLight(v) => info!("MEAS | light={}lx", Reading(Some(*v))),
            Measurement::Pressure(v) => info!("MEAS | p={}kPa", Reading(Some(*v))),
            Measurement::Battery(level) => info!("MEAS | battery={}%", level),
        }
        self.inner.on_measurement(measurement);
    }
}

/// Fixed-point value with two decimals, or `--` when the channel failed.
struct Reading(Option<SensorValue>);

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(v) = self.0 else {
            return f.write_str("--");
        };
        let centi = v.to_centi();
        let sign = if centi < 0 { "-" } else { "" };
        let abs = centi.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
