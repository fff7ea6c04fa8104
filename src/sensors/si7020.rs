//! Si7020 relative humidity and temperature sensor.
//!
//! A humidity conversion (no-hold master mode) also converts temperature;
//! the temperature is then read back with "read temperature from previous
//! RH measurement" instead of running a second conversion.
//!
//! ```text
//!  write 0xF5 ──▶ 25 ms ──▶ read 2 (RH) ──▶ burst_read 0xE0 (T)
//! ```
//!
//! Each transfer powers the rail on its own; this part keeps no state that
//! must survive between the conversion command and the read.

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::app::ports::SharedBus;
use crate::error::SensorError;
use crate::pins::SI7020_ADDR;

use super::{Sensor, SensorChannel, SensorValue};

const CMD_MEASURE_RH_NO_HOLD: u8 = 0xF5;
const CMD_READ_PREVIOUS_TEMPERATURE: u8 = 0xE0;
const CMD_RESET: u8 = 0xFE;
const CMD_WRITE_USER_REG1: u8 = 0xE6;
const CMD_READ_ELECTRONIC_ID2: [u8; 2] = [0xFC, 0xC9];

/// 12-bit RH, 14-bit temperature.
const REG1_RESOLUTION_H12_T14: u8 = 0x00;

/// SNB_3 byte of the electronic ID.
const SI7020_ID: u8 = 0x14;

const RESET_MS: u32 = 80;
const RH_CONVERSION_MS: u32 = 25;

/// Temperature code → 0.01 °C: `code × 175.72 / 65536 − 46.85`.
pub fn temperature_centi(code: u16) -> i32 {
    i32::from(code) * 17_572 / 65_536 - 4_685
}

/// Humidity code → 0.01 %RH: `code × 125 / 65536 − 6`, clamped to 0–100 %.
pub fn humidity_centi(code: u16) -> i32 {
    (i32::from(code) * 12_500 / 65_536 - 600).clamp(0, 10_000)
}

pub struct Si7020<B, D> {
    bus: B,
    delay: D,
    /// Last temperature code, if the last fetch produced one.
    temperature: Option<u16>,
    /// Last humidity code, if the last fetch produced one.
    humidity: Option<u16>,
}

impl<B: SharedBus, D: DelayNs> Si7020<B, D> {
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            temperature: None,
            humidity: None,
        }
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        self.bus.write(&[CMD_RESET], SI7020_ADDR)?;
        self.delay.delay_ms(RESET_MS);
        Ok(())
    }

    fn check_id(&mut self) -> Result<(), SensorError> {
        self.bus.write(&CMD_READ_ELECTRONIC_ID2, SI7020_ADDR)?;
        let mut id = [0u8; 6];
        self.bus.read(&mut id, SI7020_ADDR)?;
        if id[0] != SI7020_ID {
            return Err(SensorError::WrongChipId(id[0]));
        }
        Ok(())
    }

    fn set_resolution(&mut self) -> Result<(), SensorError> {
        self.bus
            .write(&[CMD_WRITE_USER_REG1, REG1_RESOLUTION_H12_T14], SI7020_ADDR)?;
        Ok(())
    }

    fn read_humidity(&mut self) -> Result<u16, SensorError> {
        self.bus.write(&[CMD_MEASURE_RH_NO_HOLD], SI7020_ADDR)?;
        self.delay.delay_ms(RH_CONVERSION_MS);
        let mut buf = [0u8; 2];
        self.bus.read(&mut buf, SI7020_ADDR)?;
        Ok(u16::from_be_bytes([buf[0], buf[1] & 0xFC]))
    }

    fn read_temperature(&mut self) -> Result<u16, SensorError> {
        let mut buf = [0u8; 2];
        self.bus
            .burst_read(SI7020_ADDR, CMD_READ_PREVIOUS_TEMPERATURE, &mut buf)?;
        Ok(u16::from_be_bytes([buf[0], buf[1] & 0xFC]))
    }
}

impl<B: SharedBus, D: DelayNs> Sensor for Si7020<B, D> {
    fn name(&self) -> &'static str {
        "SI7020"
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        self.reset()?;
        self.check_id()?;
        self.set_resolution()
    }

    /// Succeeds if at least the humidity conversion worked.  A failed
    /// temperature read-back leaves only that channel empty.
    fn sample_fetch(&mut self) -> Result<(), SensorError> {
        self.temperature = None;
        self.humidity = None;

        let rh = self.read_humidity().inspect_err(|e| {
            warn!("SI7020: humidity read failed ({})", e);
        })?;
        self.humidity = Some(rh);
        debug!("SI7020: rh code {}", rh);

        match self.read_temperature() {
            Ok(t) => {
                self.temperature = Some(t);
                debug!("SI7020: temp code {}", t);
            }
            Err(e) => warn!("SI7020: temperature read failed ({})", e),
        }
        Ok(())
    }

    fn channel_get(&self, channel: SensorChannel) -> Result<SensorValue, SensorError> {
        match channel {
            SensorChannel::AmbientTemp => self
                .temperature
                .map(|code| SensorValue::from_centi(temperature_centi(code)))
                .ok_or(SensorError::NoData),
            SensorChannel::Humidity => self
                .humidity
                .map(|code| SensorValue::from_centi(humidity_centi(code)))
                .ok_or(SensorError::NoData),
            _ => Err(SensorError::UnsupportedChannel),
        }
    }
}
