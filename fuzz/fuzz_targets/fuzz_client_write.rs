//! Fuzz target: `GattServer::write` on every attribute
//!
//! The first byte picks an attribute, the rest is the written value.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A rejected write leaves the attribute's read value unchanged
//! - Only CCC descriptors accept writes
//! - An accepted CCC write reads back as `0x0000` or `0x0001`
//!
//! cargo fuzz run fuzz_client_write

#![no_main]

use libfuzzer_sys::fuzz_target;

use envnode::app::ports::{Advertiser, Notifier};
use envnode::config::DeviceConfig;
use envnode::error::BleError;
use envnode::gatt::{AttrId, EssAttr, GattServer};

struct Null;

impl Notifier for Null {
    fn notify(&mut self, _attr: AttrId, _payload: &[u8]) -> Result<(), BleError> {
        Ok(())
    }
}

impl Advertiser for Null {
    fn start(&mut self, _payload: &[u8], _interval: u32) -> Result<(), BleError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BleError> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, value)) = data.split_first() else {
        return;
    };
    let attrs: Vec<AttrId> = AttrId::all().collect();
    let attr = attrs[usize::from(selector) % attrs.len()];

    let mut gatt = GattServer::new(Null, Null, DeviceConfig::default());
    let before = gatt.read(attr);

    match gatt.write(attr, value) {
        Ok(()) => {
            assert!(
                matches!(attr, AttrId::BatteryCcc | AttrId::Ess(_, EssAttr::Ccc)),
                "write accepted on {attr:?}"
            );
            let ccc = gatt.read(attr).unwrap();
            assert!(ccc.as_slice() == [0, 0] || ccc.as_slice() == [1, 0]);
        }
        Err(_) => assert_eq!(gatt.read(attr), before, "rejected write changed {attr:?}"),
    }
});
