//! Legacy advertising payload.
//!
//! ```text
//!  ┌──────────────┬─────────────────────┬──────────────────┬──────────────────────────┐
//!  │ 02 01 06     │ 03 02 1A 18         │ n+1 09 name…     │ 04 16 0F 18 level        │
//!  │ flags        │ 16-bit UUIDs (ESS)  │ local name       │ service data (BAS)       │
//!  └──────────────┴─────────────────────┴──────────────────┴──────────────────────────┘
//! ```
//!
//! The battery level is the last byte of the service-data structure so a
//! scanner can read it without connecting.

use heapless::Vec;

use super::{BAS_UUID, ESS_UUID};

/// Legacy advertising PDU data limit.
pub const ADV_MAX_LEN: usize = 31;

const AD_FLAGS: u8 = 0x01;
const AD_UUID16_INCOMPLETE: u8 = 0x02;
const AD_NAME_SHORT: u8 = 0x08;
const AD_NAME_COMPLETE: u8 = 0x09;
const AD_SERVICE_DATA16: u8 = 0x16;

/// LE General Discoverable, BR/EDR not supported.
const FLAGS: u8 = 0x06;

/// Bytes taken by every structure except the name.
const FIXED_LEN: usize = 3 + 4 + 5;
/// Name header (length + type).
const NAME_HEADER: usize = 2;

#[derive(Debug, Clone)]
pub struct AdvertisingData {
    payload: Vec<u8, ADV_MAX_LEN>,
}

impl AdvertisingData {
    /// Build the payload.  A name too long to fit is cut and sent as a
    /// shortened name.
    pub fn new(name: &str, battery_level: u8) -> Self {
        let room = ADV_MAX_LEN - FIXED_LEN - NAME_HEADER;
        let (name, name_type) = if name.len() > room {
            (&name.as_bytes()[..room], AD_NAME_SHORT)
        } else {
            (name.as_bytes(), AD_NAME_COMPLETE)
        };

        let ess = ESS_UUID.to_le_bytes();
        let bas = BAS_UUID.to_le_bytes();
        let mut payload = Vec::new();
        // Total length is bounded by `room` above.
        let _ = payload.extend_from_slice(&[0x02, AD_FLAGS, FLAGS]);
        let _ = payload.extend_from_slice(&[0x03, AD_UUID16_INCOMPLETE, ess[0], ess[1]]);
        let _ = payload.extend_from_slice(&[name.len() as u8 + 1, name_type]);
        let _ = payload.extend_from_slice(name);
        let _ = payload.extend_from_slice(&[0x04, AD_SERVICE_DATA16, bas[0], bas[1], battery_level]);
        Self { payload }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn battery_level(&self) -> u8 {
        self.payload.last().copied().unwrap_or(0)
    }

    pub fn set_battery_level(&mut self, level: u8) {
        if let Some(b) = self.payload.last_mut() {
            *b = level;
        }
    }

    /// Service-data body: BAS UUID (LE) followed by the level.
    pub fn service_data(&self) -> &[u8] {
        &self.payload[self.payload.len() - 3..]
    }
}
