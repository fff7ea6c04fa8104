//! BMP280 barometric pressure sensor, forced mode.
//!
//! The chip loses its configuration when the rail drops, so every fetch
//! writes `config` and `ctrl_meas` and waits for the forced conversion with
//! the permit held.  Factory calibration lives in NVM on the die and is
//! read once at probe.
//!
//! Compensation is the Bosch integer reference (32-bit temperature, 64-bit
//! pressure).  Pressure comes out in Pa as Q24.8.

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::app::ports::SharedBus;
use crate::config::BUS_PERMIT_TIMEOUT_MS;
use crate::drivers::power_bus::PermitGuard;
use crate::error::SensorError;
use crate::pins::BMP280_ADDR;

use super::{Sensor, SensorChannel, SensorValue};

const REG_CALIB_START: u8 = 0x88;
const REG_ID: u8 = 0xD0;
const REG_RESET: u8 = 0xE0;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_PRESS_MSB: u8 = 0xF7;

const CHIP_ID: u8 = 0x58;
const SOFT_RESET: u8 = 0xB6;

/// No IIR filter, standby irrelevant in forced mode.
const CONFIG_VALUE: u8 = 0x00;
/// osrs_t ×1, osrs_p ×4, forced mode.
const CTRL_MEAS_FORCED: u8 = (0b001 << 5) | (0b011 << 2) | 0b01;

const RESET_MS: u32 = 10;
const CONVERSION_MS: u32 = 20;

/// Trimming parameters `dig_T1..dig_P9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

impl Calibration {
    /// Decode the 24 bytes starting at register 0x88.
    pub fn from_bytes(b: &[u8; 24]) -> Self {
        let u = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([b[i], b[i + 1]]);
        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
        }
    }

    /// Returns `t_fine`, the shared temperature term.
    ///
    /// Intermediate products are 64-bit: an erased NVM reads back as 0xFF
    /// words and the reference 32-bit products overflow on those.  The sum
    /// stays within ±2^24 for any 20-bit `adc_t`.
    pub fn t_fine(&self, adc_t: i32) -> i32 {
        let adc_t = i64::from(adc_t);
        let t1 = i64::from(self.t1);
        let var1 = (((adc_t >> 3) - (t1 << 1)) * i64::from(self.t2)) >> 11;
        let d = (adc_t >> 4) - t1;
        let var2 = (((d * d) >> 12) * i64::from(self.t3)) >> 14;
        i32::try_from(var1 + var2).unwrap_or(i32::MAX)
    }

    /// Temperature in 0.01 °C.
    pub fn temperature_centi(t_fine: i32) -> i32 {
        (t_fine * 5 + 128) >> 8
    }

    /// Pressure in Pa as Q24.8.  Returns `None` when `dig_P1` is zero or a
    /// corrupt calibration overflows the 64-bit reference arithmetic.
    pub fn pressure_q24_8(&self, adc_p: i32, t_fine: i32) -> Option<u32> {
        let mut var1 = i64::from(t_fine) - 128_000;
        let mut var2 = var1 * var1 * i64::from(self.p6);
        var2 += (var1 * i64::from(self.p5)) << 17;
        var2 += i64::from(self.p4) << 35;
        var1 = ((var1 * var1 * i64::from(self.p3)) >> 8) + ((var1 * i64::from(self.p2)) << 12);
        var1 = ((1_i64 << 47) + var1).checked_mul(i64::from(self.p1))? >> 33;
        if var1 == 0 {
            return None;
        }
        let mut p = 1_048_576 - i64::from(adc_p);
        p = ((p << 31) - var2).checked_mul(3125)? / var1;
        let var1 = (p >> 13).checked_mul(p >> 13)?.checked_mul(i64::from(self.p9))? >> 25;
        let var2 = p.checked_mul(i64::from(self.p8))? >> 19;
        p = (p.checked_add(var1)?.checked_add(var2)? >> 8) + (i64::from(self.p7) << 4);
        u32::try_from(p).ok()
    }
}

/// 20-bit ADC word from the three data registers.
fn adc20(msb: u8, lsb: u8, xlsb: u8) -> i32 {
    (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
}

pub struct Bmp280<B, D> {
    bus: B,
    delay: D,
    calib: Calibration,
    /// Q24.8 Pa.
    pressure: Option<u32>,
    /// 0.01 °C.
    temperature: Option<i32>,
}

impl<B: SharedBus, D: DelayNs> Bmp280<B, D> {
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            calib: Calibration::default(),
            pressure: None,
            temperature: None,
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calib
    }

    fn convert(&mut self) -> Result<(), SensorError> {
        let span = PermitGuard::acquire(&self.bus, BUS_PERMIT_TIMEOUT_MS)?;
        self.bus.write(&[REG_CONFIG, CONFIG_VALUE], BMP280_ADDR)?;
        self.bus.write(&[REG_CTRL_MEAS, CTRL_MEAS_FORCED], BMP280_ADDR)?;
        self.delay.delay_ms(CONVERSION_MS);
        span.finish();
        Ok(())
    }
}

impl<B: SharedBus, D: DelayNs> Sensor for Bmp280<B, D> {
    fn name(&self) -> &'static str {
        "BMP280"
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        self.bus.write(&[REG_RESET, SOFT_RESET], BMP280_ADDR)?;
        self.delay.delay_ms(RESET_MS);

        let mut id = [0u8; 1];
        self.bus.burst_read(BMP280_ADDR, REG_ID, &mut id)?;
        if id[0] != CHIP_ID {
            return Err(SensorError::WrongChipId(id[0]));
        }

        let mut raw = [0u8; 24];
        self.bus.burst_read(BMP280_ADDR, REG_CALIB_START, &mut raw)?;
        self.calib = Calibration::from_bytes(&raw);
        debug!("BMP280: calibration {:?}", self.calib);
        Ok(())
    }

    fn sample_fetch(&mut self) -> Result<(), SensorError> {
        self.pressure = None;
        self.temperature = None;

        self.convert()
            .inspect_err(|e| warn!("BMP280: forced conversion failed ({})", e))?;

        let mut buf = [0u8; 6];
        self.bus
            .burst_read(BMP280_ADDR, REG_PRESS_MSB, &mut buf)
            .inspect_err(|e| warn!("BMP280: data read failed ({})", e))?;

        let adc_p = adc20(buf[0], buf[1], buf[2]);
        let adc_t = adc20(buf[3], buf[4], buf[5]);
        let t_fine = self.calib.t_fine(adc_t);
        self.temperature = Some(Calibration::temperature_centi(t_fine));
        self.pressure = self.calib.pressure_q24_8(adc_p, t_fine);
        if self.pressure.is_none() {
            warn!("BMP280: pressure compensation failed, calibration not loaded");
            return Err(SensorError::NoData);
        }
        Ok(())
    }

    fn channel_get(&self, channel: SensorChannel) -> Result<SensorValue, SensorError> {
        match channel {
            // Q24.8 Pa × 1000 / 256 = millionths of a kPa.
            SensorChannel::Pressure => self
                .pressure
                .map(|p| SensorValue::from_micro(i64::from(p) * 1_000 / 256))
                .ok_or(SensorError::NoData),
            SensorChannel::DieTemp => self
                .temperature
                .map(SensorValue::from_centi)
                .ok_or(SensorError::NoData),
            _ => Err(SensorError::UnsupportedChannel),
        }
    }
}
