//! Persisted configuration records on top of the [`KvStore`] port.
//!
//! Every record is stored as one version byte followed by the postcard
//! encoding of the record.  A blob whose length or version does not match,
//! or whose fields fail validation, reads back as [`ConfigError::Corrupted`];
//! the seeding helpers treat it like a first boot.
//!
//! ```text
//!  load_or_seed ──▶ read ──┬─ Ok ─────────────────────────▶ record
//!                          ├─ NotFound / Corrupted ─▶ write default ─▶ read ─▶ record
//!                          └─ IoError ──────────────▶ default (not persisted)
//! ```

use log::{error, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{ConfigKey, DeviceConfig, RECORD_VERSION, SensorConfig};
use crate::error::ConfigError;

use super::ports::KvStore;

/// Largest record, version byte included.
const MAX_RECORD_LEN: usize = SensorConfig::RECORD_LEN;

pub struct ConfigStore<S> {
    store: S,
}

impl<S: KvStore> ConfigStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    // ── Sensor records ─────────────────────────────────────────

    pub fn sensor_config(&self, key: ConfigKey) -> Result<SensorConfig, ConfigError> {
        let cfg: SensorConfig = self.read_record(key, SensorConfig::RECORD_LEN)?;
        in_range(key, cfg.validate()).map(|()| cfg)
    }

    /// Validate and persist a sensor record.
    pub fn set_sensor_config(&mut self, key: ConfigKey, cfg: &SensorConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        self.write_record(key, cfg)
    }

    /// Read a sensor record, seeding `default` if none is stored yet.
    pub fn load_or_seed_sensor(&mut self, key: ConfigKey, default: SensorConfig) -> SensorConfig {
        match self.sensor_config(key) {
            Ok(cfg) => {
                info!("ConfigStore: {} loaded", key.name());
                cfg
            }
            Err(ConfigError::NotFound | ConfigError::Corrupted) => {
                self.seed(key, &default, |s| s.sensor_config(key))
            }
            Err(e) => {
                error!("ConfigStore: {} read failed ({}), using defaults", key.name(), e);
                default
            }
        }
    }

    // ── Device record ──────────────────────────────────────────

    pub fn device_config(&self) -> Result<DeviceConfig, ConfigError> {
        let cfg: DeviceConfig = self.read_record(ConfigKey::Device, DeviceConfig::RECORD_LEN)?;
        in_range(ConfigKey::Device, cfg.validate()).map(|()| cfg)
    }

    pub fn set_device_config(&mut self, cfg: &DeviceConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        self.write_record(ConfigKey::Device, cfg)
    }

    pub fn load_or_seed_device(&mut self, default: DeviceConfig) -> DeviceConfig {
        match self.device_config() {
            Ok(cfg) => {
                info!("ConfigStore: device loaded");
                cfg
            }
            Err(ConfigError::NotFound | ConfigError::Corrupted) => {
                self.seed(ConfigKey::Device, &default, Self::device_config)
            }
            Err(e) => {
                error!("ConfigStore: device read failed ({}), using defaults", e);
                default
            }
        }
    }

    // ── Encoding ───────────────────────────────────────────────

    /// First-boot path: write the default, then read it back to confirm.
    fn seed<T>(
        &mut self,
        key: ConfigKey,
        default: &T,
        reread: impl FnOnce(&Self) -> Result<T, ConfigError>,
    ) -> T
    where
        T: Serialize + Copy,
    {
        info!("ConfigStore: seeding {} with defaults", key.name());
        if let Err(e) = self.write_record(key, default) {
            error!("ConfigStore: {} seed write failed ({})", key.name(), e);
            return *default;
        }
        match reread(self) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("ConfigStore: {} re-read after seed failed ({})", key.name(), e);
                *default
            }
        }
    }

    fn read_record<T: DeserializeOwned>(&self, key: ConfigKey, len: usize) -> Result<T, ConfigError> {
        let mut buf = [0u8; MAX_RECORD_LEN];
        let n = self.store.read(key.id(), &mut buf)?;
        if n != len || buf[0] != RECORD_VERSION {
            warn!(
                "ConfigStore: {} record has {} bytes, version {}",
                key.name(),
                n,
                buf[0]
            );
            return Err(ConfigError::Corrupted);
        }
        postcard::from_bytes(&buf[1..n]).map_err(|_| ConfigError::Corrupted)
    }

    fn write_record<T: Serialize>(&mut self, key: ConfigKey, record: &T) -> Result<(), ConfigError> {
        let mut buf = [0u8; MAX_RECORD_LEN];
        buf[0] = RECORD_VERSION;
        let used = postcard::to_slice(record, &mut buf[1..])
            .map_err(|_| ConfigError::IoError)?
            .len();
        self.store.write(key.id(), &buf[..=used])?;
        Ok(())
    }
}

/// A decoded record that fails validation is treated as corrupted.
fn in_range(key: ConfigKey, check: Result<(), ConfigError>) -> Result<(), ConfigError> {
    check.map_err(|e| {
        warn!("ConfigStore: {} record rejected ({})", key.name(), e);
        ConfigError::Corrupted
    })
}
