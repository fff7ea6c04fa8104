//! Environmental Sensing Service characteristic model.
//!
//! One [`EssCharacteristic`] per quantity.  Each carries the attributes a
//! client can read (value, user description, ES measurement, valid range,
//! trigger setting) and the notify flag, which only the CCC write path
//! changes.
//!
//! ```text
//!  update(new) ─▶ trigger.evaluate(old, new) ─▶ store new ─▶ publish
//!                                                   │
//!                         notify_enabled && fired ──┴──▶ notify(LE bytes)
//! ```

use heapless::Vec;
use log::{debug, warn};

use crate::app::events::Quantity;
use crate::app::ports::Notifier;
use crate::config::SensorConfig;
use crate::error::BleError;

use super::trigger::{TRIGGER_MAX_LEN, Trigger, TriggerValue};
use super::{ATTR_MAX_LEN, AttrId, EssAttr, parse_ccc};

/// ES Measurement descriptor length.
pub const MEASUREMENT_DESCRIPTOR_LEN: usize = 11;

pub struct EssCharacteristic<T> {
    quantity: Quantity,
    value: T,
    range: (T, T),
    trigger: Trigger<T>,
    notify_enabled: bool,
    measurement: SensorConfig,
    description: &'static str,
}

impl<T: TriggerValue> EssCharacteristic<T> {
    /// Power-on state: value 0, value-changed trigger, notifications off.
    pub fn new(
        quantity: Quantity,
        range: (T, T),
        measurement: SensorConfig,
        description: &'static str,
    ) -> Self {
        Self {
            quantity,
            value: T::default(),
            range,
            trigger: Trigger::default(),
            notify_enabled: false,
            measurement,
            description,
        }
    }

    fn attr(&self, attr: EssAttr) -> AttrId {
        AttrId::Ess(self.quantity, attr)
    }

    /// Store a new value, notifying subscribers if the trigger fires.
    /// Returns whether a notification was sent.
    pub fn update(&mut self, new: T, notifier: &mut impl Notifier) -> bool {
        let fire = self.trigger.evaluate(self.value, new);
        self.value = new;

        let attr = self.attr(EssAttr::Value);
        let bytes = self.value_bytes();
        notifier.publish(attr, &bytes);

        if !self.notify_enabled || !fire {
            return false;
        }
        match notifier.notify(attr, &bytes) {
            Ok(()) => {
                debug!("ESS: {:?} notified", self.quantity);
                true
            }
            Err(e) => {
                warn!("ESS: {:?} notification failed ({})", self.quantity, e);
                false
            }
        }
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled
    }

    pub fn trigger(&self) -> Trigger<T> {
        self.trigger
    }

    pub fn measurement(&self) -> &SensorConfig {
        &self.measurement
    }

    pub fn set_measurement(&mut self, cfg: SensorConfig) {
        self.measurement = cfg;
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    // ── Read encodings ────────────────────────────────────────

    pub fn value_bytes(&self) -> Vec<u8, 4> {
        self.value.to_le()
    }

    /// Flags (reserved, 0), sampling function, 24-bit measurement period,
    /// 24-bit update interval, application, uncertainty.
    pub fn measurement_bytes(&self) -> [u8; MEASUREMENT_DESCRIPTOR_LEN] {
        let m = &self.measurement;
        let period = m.measurement_period.to_le_bytes();
        let interval = m.update_interval.to_le_bytes();
        [
            0x00,
            0x00,
            m.sampling_function,
            period[0],
            period[1],
            period[2],
            interval[0],
            interval[1],
            interval[2],
            m.application,
            m.uncertainty,
        ]
    }

    /// Lower then upper bound, each in the value's native width: 4 bytes for
    /// the 16-bit quantities, 8 for pressure.
    pub fn valid_range_bytes(&self) -> Vec<u8, 8> {
        let mut out = Vec::new();
        let _ = out.extend_from_slice(&self.range.0.to_le());
        let _ = out.extend_from_slice(&self.range.1.to_le());
        out
    }

    pub fn trigger_bytes(&self) -> Vec<u8, TRIGGER_MAX_LEN> {
        self.trigger.encode()
    }

    pub fn ccc_bytes(&self) -> [u8; 2] {
        u16::from(self.notify_enabled).to_le_bytes()
    }

    // ── Writes ────────────────────────────────────────────────

    pub fn on_ccc_write(&mut self, data: &[u8]) -> Result<(), BleError> {
        self.notify_enabled = parse_ccc(data)?;
        debug!(
            "ESS: {:?} notifications {}",
            self.quantity,
            if self.notify_enabled { "on" } else { "off" }
        );
        Ok(())
    }
}

// ── Type-erased attribute access ──────────────────────────────

/// Attribute reads and writes of one characteristic, independent of its
/// value width.
pub trait EssAttributes {
    fn read_attr(&self, attr: EssAttr) -> Result<Vec<u8, ATTR_MAX_LEN>, BleError>;

    fn write_attr(&mut self, attr: EssAttr, data: &[u8]) -> Result<(), BleError>;

    fn set_measurement_config(&mut self, cfg: SensorConfig);
}

impl<T: TriggerValue> EssAttributes for EssCharacteristic<T> {
    fn read_attr(&self, attr: EssAttr) -> Result<Vec<u8, ATTR_MAX_LEN>, BleError> {
        let mut out = Vec::new();
        let res = match attr {
            EssAttr::Value => out.extend_from_slice(&self.value_bytes()),
            EssAttr::UserDescription => out.extend_from_slice(self.description.as_bytes()),
            EssAttr::Measurement => out.extend_from_slice(&self.measurement_bytes()),
            EssAttr::ValidRange => out.extend_from_slice(&self.valid_range_bytes()),
            EssAttr::TriggerSetting => out.extend_from_slice(&self.trigger_bytes()),
            EssAttr::Ccc => out.extend_from_slice(&self.ccc_bytes()),
        };
        res.map_err(|()| BleError::InvalidAttributeLength)?;
        Ok(out)
    }

    fn write_attr(&mut self, attr: EssAttr, data: &[u8]) -> Result<(), BleError> {
        match attr {
            EssAttr::Ccc => self.on_ccc_write(data),
            _ => Err(BleError::InvalidAttribute),
        }
    }

    fn set_measurement_config(&mut self, cfg: SensorConfig) {
        self.set_measurement(cfg);
    }
}
