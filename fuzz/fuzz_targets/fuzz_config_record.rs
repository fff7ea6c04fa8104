//! Fuzz target: `ConfigStore` decoding of stored records
//!
//! Places arbitrary bytes in flash under a sensor key and the device key,
//! then boots the store over them.
//!
//! Invariants checked:
//! - No panics under any stored blob
//! - A blob that decodes is returned as-is; anything else is reseeded
//! - After `load_or_seed_*`, the stored record always decodes
//! - A loaded record always passes validation
//!
//! cargo fuzz run fuzz_config_record

#![no_main]

use libfuzzer_sys::fuzz_target;

use envnode::adapters::nvs::NvsAdapter;
use envnode::app::config_store::ConfigStore;
use envnode::app::ports::KvStore;
use envnode::config::{ConfigKey, DeviceConfig, SensorConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(mut nvs) = NvsAdapter::new() else {
        return;
    };
    let _ = nvs.write(ConfigKey::Humidity.id(), data);
    let _ = nvs.write(ConfigKey::Device.id(), data);
    let mut store = ConfigStore::new(nvs);

    let default = SensorConfig::default_for(ConfigKey::Humidity);
    let stored = store.sensor_config(ConfigKey::Humidity);
    let loaded = store.load_or_seed_sensor(ConfigKey::Humidity, default);
    match stored {
        Ok(cfg) => assert_eq!(loaded, cfg),
        Err(_) => assert_eq!(loaded, default),
    }
    assert!(loaded.validate().is_ok());
    assert!(store.sensor_config(ConfigKey::Humidity).is_ok());

    let device = store.load_or_seed_device(DeviceConfig::default());
    assert!(device.validate().is_ok());
    assert_eq!(store.device_config(), Ok(device));
});
