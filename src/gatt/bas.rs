//! Battery Service: one level byte, readable and notifiable.

use log::warn;

use crate::app::ports::Notifier;
use crate::error::BleError;

use super::{AttrId, parse_ccc};

#[derive(Debug, Default)]
pub struct BatteryService {
    level: u8,
    notify_enabled: bool,
}

impl BatteryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled
    }

    /// Store a new level (clamped to 100) and notify if subscribed.
    pub fn set_level(&mut self, level: u8, notifier: &mut impl Notifier) {
        self.level = level.min(100);
        notifier.publish(AttrId::BatteryLevel, &[self.level]);
        if !self.notify_enabled {
            return;
        }
        if let Err(e) = notifier.notify(AttrId::BatteryLevel, &[self.level]) {
            warn!("BAS: notification failed ({})", e);
        }
    }

    pub fn ccc_bytes(&self) -> [u8; 2] {
        u16::from(self.notify_enabled).to_le_bytes()
    }

    pub fn on_ccc_write(&mut self, data: &[u8]) -> Result<(), BleError> {
        self.notify_enabled = parse_ccc(data)?;
        Ok(())
    }
}
