//! TSL4531 ambient light sensor.
//!
//! The single-shot conversion runs for 400 ms, during which the chip must
//! stay powered, so the fetch holds the bus permit from the control write
//! until the integration time has passed.  The data read that follows is an
//! ordinary transfer and drops the rail when it completes.  A failed start
//! drops the rail as the permit span unwinds.

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::app::ports::SharedBus;
use crate::config::BUS_PERMIT_TIMEOUT_MS;
use crate::drivers::power_bus::PermitGuard;
use crate::error::SensorError;
use crate::pins::TSL4531_ADDR;

use super::{Sensor, SensorChannel, SensorValue};

const CMD_CONTROL: u8 = 0x80;
const CMD_DATA_LOW: u8 = 0x84;
const CMD_ID: u8 = 0x8A;

const MODE_SINGLE_SHOT: u8 = 0x02;

/// Upper nibble of the ID register, one per package variant.
const KNOWN_IDS: [u8; 4] = [0xB0, 0x90, 0xA0, 0x80];

/// 400 ms integration plus margin.
const CONVERSION_MS: u32 = 420;

pub struct Tsl4531<B, D> {
    bus: B,
    delay: D,
    lux: Option<u16>,
}

impl<B: SharedBus, D: DelayNs> Tsl4531<B, D> {
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            lux: None,
        }
    }

    /// Start the conversion and wait it out with the rail held up.
    fn convert(&mut self) -> Result<(), SensorError> {
        let span = PermitGuard::acquire(&self.bus, BUS_PERMIT_TIMEOUT_MS)?;
        self.bus
            .write(&[CMD_CONTROL, MODE_SINGLE_SHOT], TSL4531_ADDR)?;
        self.delay.delay_ms(CONVERSION_MS);
        span.finish();
        Ok(())
    }
}

impl<B: SharedBus, D: DelayNs> Sensor for Tsl4531<B, D> {
    fn name(&self) -> &'static str {
        "TSL4531"
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        let mut id = [0u8; 1];
        self.bus.burst_read(TSL4531_ADDR, CMD_ID, &mut id)?;
        let id = id[0] & 0xF0;
        if !KNOWN_IDS.contains(&id) {
            return Err(SensorError::WrongChipId(id));
        }
        debug!("TSL4531: id 0x{:02x}", id);
        Ok(())
    }

    fn sample_fetch(&mut self) -> Result<(), SensorError> {
        self.lux = None;
        self.convert().inspect_err(|e| warn!("TSL4531: start failed ({})", e))?;

        let mut buf = [0u8; 2];
        self.bus
            .burst_read(TSL4531_ADDR, CMD_DATA_LOW, &mut buf)
            .inspect_err(|e| warn!("TSL4531: data read failed ({})", e))?;
        let lux = u16::from_le_bytes(buf);
        debug!("TSL4531: {} lx", lux);
        self.lux = Some(lux);
        Ok(())
    }

    fn channel_get(&self, channel: SensorChannel) -> Result<SensorValue, SensorError> {
        match channel {
            SensorChannel::Light => self
                .lux
                .map(|lux| SensorValue::new(i32::from(lux), 0))
                .ok_or(SensorError::NoData),
            _ => Err(SensorError::UnsupportedChannel),
        }
    }
}
