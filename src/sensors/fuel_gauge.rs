//! Battery fuel gauge.
//!
//! Estimates remaining capacity of a coin cell from its terminal voltage.
//! Each fetch takes one ADC sample into a 30-slot ring; the reported
//! voltage is the mean of the slots filled so far, which smooths the sag
//! caused by radio bursts.
//!
//! | Terminal voltage | Capacity |
//! |------------------|----------|
//! | ≤ 2400 mV        | 0 %      |
//! | 2750 mV          | 50 %     |
//! | ≥ 3100 mV        | 100 %    |

use log::{debug, warn};

use crate::app::ports::BatteryAdc;
use crate::error::SensorError;

use super::{Sensor, SensorChannel, SensorValue};

pub const VBAT_SAMPLES: usize = 30;

/// Band-gap reference, millivolts.
const VBG_MV: u32 = 1200;
/// Input divider in front of the ADC.
const PRESCALER: u32 = 3;
/// 10-bit full scale.
const ADC_FULL_SCALE: u32 = 1024;
/// Drop across the internal resistance at the typical load, millivolts.
const LOAD_COMPENSATION_MV: u32 = 5;

const V_EMPTY_MV: u32 = 2400;
const V_FULL_MV: u32 = 3100;

/// Raw 10-bit reading → terminal millivolts.
pub fn raw_to_millivolts(raw: u16) -> u16 {
    let mv = u32::from(raw) * PRESCALER * VBG_MV / ADC_FULL_SCALE + LOAD_COMPENSATION_MV;
    u16::try_from(mv).unwrap_or(u16::MAX)
}

/// Linear capacity between the empty and full voltages, rounded to the
/// nearest percent.
pub fn capacity_percent(mv: u16) -> u8 {
    let mv = u32::from(mv).clamp(V_EMPTY_MV, V_FULL_MV);
    let span = V_FULL_MV - V_EMPTY_MV;
    let pct = ((mv - V_EMPTY_MV) * 100 + span / 2) / span;
    u8::try_from(pct).unwrap_or(100)
}

pub struct FuelGauge<A> {
    adc: A,
    samples: [u16; VBAT_SAMPLES],
    next: usize,
}

impl<A: BatteryAdc> FuelGauge<A> {
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            samples: [0; VBAT_SAMPLES],
            next: 0,
        }
    }

    /// Mean of the non-empty slots, if any sample was taken yet.
    pub fn average_mv(&self) -> Option<u16> {
        let (sum, n) = self
            .samples
            .iter()
            .filter(|&&s| s != 0)
            .fold((0u32, 0u32), |(sum, n), &s| (sum + u32::from(s), n + 1));
        if n == 0 {
            return None;
        }
        u16::try_from(sum / n).ok()
    }

    pub fn capacity(&self) -> Option<u8> {
        self.average_mv().map(capacity_percent)
    }
}

impl<A: BatteryAdc> Sensor for FuelGauge<A> {
    fn name(&self) -> &'static str {
        "FUEL_GAUGE"
    }

    fn sample_fetch(&mut self) -> Result<(), SensorError> {
        let raw = self
            .adc
            .read_raw()
            .inspect_err(|e| warn!("FG: ADC read failed ({})", e))?;
        let mv = raw_to_millivolts(raw);
        self.samples[self.next] = mv;
        self.next = (self.next + 1) % VBAT_SAMPLES;
        debug!("FG: raw {} → {} mV", raw, mv);
        Ok(())
    }

    fn channel_get(&self, channel: SensorChannel) -> Result<SensorValue, SensorError> {
        match channel {
            SensorChannel::BatteryVoltage => self
                .average_mv()
                .map(|mv| SensorValue::from_milli(i64::from(mv)))
                .ok_or(SensorError::NoData),
            SensorChannel::StateOfCharge => self
                .capacity()
                .map(|pct| SensorValue::new(i32::from(pct), 0))
                .ok_or(SensorError::NoData),
            _ => Err(SensorError::UnsupportedChannel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAdc(Vec<Result<u16, SensorError>>);

    impl BatteryAdc for FixedAdc {
        fn read_raw(&mut self) -> Result<u16, SensorError> {
            self.0.remove(0)
        }
    }

    #[test]
    fn conversion_includes_load_compensation() {
        // 768 × 3 × 1200 / 1024 = 2700
        assert_eq!(raw_to_millivolts(768), 2_705);
        assert_eq!(raw_to_millivolts(0), 5);
    }

    #[test]
    fn capacity_curve_is_clamped_and_rounded() {
        assert_eq!(capacity_percent(2_000), 0);
        assert_eq!(capacity_percent(2_400), 0);
        assert_eq!(capacity_percent(2_750), 50);
        assert_eq!(capacity_percent(2_704), 43);
        assert_eq!(capacity_percent(3_100), 100);
        assert_eq!(capacity_percent(3_600), 100);
    }

    #[test]
    fn empty_filter_has_no_data() {
        let fg = FuelGauge::new(FixedAdc(vec![]));
        assert_eq!(fg.average_mv(), None);
        assert_eq!(fg.channel_get(SensorChannel::StateOfCharge), Err(SensorError::NoData));
    }

    #[test]
    fn average_ignores_unfilled_slots() {
        let mut fg = FuelGauge::new(FixedAdc(vec![Ok(768), Ok(800)]));
        fg.sample_fetch().unwrap();
        fg.sample_fetch().unwrap();
        // (2705 + 2817) / 2
        assert_eq!(fg.average_mv(), Some(2_761));
        assert_eq!(
            fg.channel_get(SensorChannel::BatteryVoltage),
            Ok(SensorValue::new(2, 761_000))
        );
    }

    #[test]
    fn ring_wraps_after_thirty_samples() {
        let mut reads: Vec<_> = (0..VBAT_SAMPLES).map(|_| Ok(700)).collect();
        reads.push(Ok(900));
        let mut fg = FuelGauge::new(FixedAdc(reads));
        for _ in 0..=VBAT_SAMPLES {
            fg.sample_fetch().unwrap();
        }
        assert_eq!(fg.samples[0], raw_to_millivolts(900));
        assert_eq!(fg.next, 1);
    }

    #[test]
    fn adc_failure_leaves_filter_untouched() {
        let mut fg = FuelGauge::new(FixedAdc(vec![Err(SensorError::AdcReadFailed)]));
        assert_eq!(fg.sample_fetch(), Err(SensorError::AdcReadFailed));
        assert_eq!(fg.capacity(), None);
    }
}
