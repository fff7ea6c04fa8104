//! GATT data model: DIS, BAS and ESS, plus the advertising payload.
//!
//! The model is transport-agnostic.  [`GattServer`] owns every
//! characteristic, converts measurements to characteristic units and
//! drives the BLE stack only through the [`Notifier`] and [`Advertiser`]
//! ports.
//!
//! | Service | UUID   | Characteristics                                   |
//! |---------|--------|---------------------------------------------------|
//! | DIS     | 0x180A | Software Revision 0x2A28, Hardware Revision 0x2A27 |
//! | BAS     | 0x180F | Battery Level 0x2A19 (read, notify)               |
//! | ESS     | 0x181A | Temperature 0x2A6E, Humidity 0x2A6F,              |
//! |         |        | Irradiance 0x2A77, Pressure 0x2A6D                |
//!
//! Each ESS characteristic carries CUD 0x2901, ES Measurement 0x290C,
//! Valid Range 0x2906, ES Trigger Setting 0x290D and CCC 0x2902.

pub mod advertising;
pub mod bas;
pub mod dis;
pub mod ess;
pub mod trigger;

use heapless::Vec;
use log::{info, warn};

use crate::app::events::{Measurement, Quantity};
use crate::app::ports::{Advertiser, MeasurementSink, Notifier};
use crate::config::{
    AMBIENT_LIGHT_RANGE, DEVICE_NAME, DeviceConfig, HUMIDITY_RANGE, PRESSURE_RANGE,
    SensorConfig, TEMPERATURE_RANGE,
};
use crate::error::BleError;
use crate::sensors::SensorValue;

use advertising::AdvertisingData;
use bas::BatteryService;
use dis::DeviceInformation;
use ess::{EssAttributes, EssCharacteristic};

// ── UUIDs ──────────────────────────────────────────────────────

pub const ESS_UUID: u16 = 0x181A;
pub const BAS_UUID: u16 = 0x180F;
pub const DIS_UUID: u16 = 0x180A;

pub const TEMPERATURE_UUID: u16 = 0x2A6E;
pub const HUMIDITY_UUID: u16 = 0x2A6F;
pub const IRRADIANCE_UUID: u16 = 0x2A77;
pub const PRESSURE_UUID: u16 = 0x2A6D;
pub const BATTERY_LEVEL_UUID: u16 = 0x2A19;
pub const SOFTWARE_REVISION_UUID: u16 = 0x2A28;
pub const HARDWARE_REVISION_UUID: u16 = 0x2A27;

pub const CUD_UUID: u16 = 0x2901;
pub const CCC_UUID: u16 = 0x2902;
pub const VALID_RANGE_UUID: u16 = 0x2906;
pub const ES_MEASUREMENT_UUID: u16 = 0x290C;
pub const ES_TRIGGER_SETTING_UUID: u16 = 0x290D;

/// Largest attribute value served by the model.
pub const ATTR_MAX_LEN: usize = 32;

// ── Attribute addressing ───────────────────────────────────────

/// Attribute within one ESS characteristic group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EssAttr {
    Value,
    UserDescription,
    Measurement,
    ValidRange,
    TriggerSetting,
    Ccc,
}

impl EssAttr {
    pub const ALL: [Self; 6] = [
        Self::Value,
        Self::UserDescription,
        Self::Measurement,
        Self::ValidRange,
        Self::TriggerSetting,
        Self::Ccc,
    ];

    pub fn uuid(self, quantity: Quantity) -> u16 {
        match self {
            Self::Value => quantity.uuid(),
            Self::UserDescription => CUD_UUID,
            Self::Measurement => ES_MEASUREMENT_UUID,
            Self::ValidRange => VALID_RANGE_UUID,
            Self::TriggerSetting => ES_TRIGGER_SETTING_UUID,
            Self::Ccc => CCC_UUID,
        }
    }
}

/// Every attribute of the model a client can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrId {
    SoftwareRevision,
    HardwareRevision,
    BatteryLevel,
    BatteryCcc,
    Ess(Quantity, EssAttr),
}

impl AttrId {
    /// Every attribute, DIS first, then BAS, then each ESS group.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::SoftwareRevision,
            Self::HardwareRevision,
            Self::BatteryLevel,
            Self::BatteryCcc,
        ]
        .into_iter()
        .chain(
            Quantity::ALL
                .into_iter()
                .flat_map(|q| EssAttr::ALL.into_iter().map(move |a| Self::Ess(q, a))),
        )
    }
}

impl Quantity {
    /// Characteristic UUID of this quantity's value.
    pub fn uuid(self) -> u16 {
        match self {
            Self::Temperature => TEMPERATURE_UUID,
            Self::Humidity => HUMIDITY_UUID,
            Self::AmbientLight => IRRADIANCE_UUID,
            Self::Pressure => PRESSURE_UUID,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature Sensor",
            Self::Humidity => "Humidity Sensor",
            Self::AmbientLight => "Ambient Light Sensor",
            Self::Pressure => "Barometric Pressure Sensor",
        }
    }
}

/// Decode a Client Characteristic Configuration write.  `0x0001` enables
/// notifications; every other value disables them.
pub fn parse_ccc(data: &[u8]) -> Result<bool, BleError> {
    let bytes: [u8; 2] = data
        .try_into()
        .map_err(|_| BleError::InvalidAttributeLength)?;
    Ok(u16::from_le_bytes(bytes) == 0x0001)
}

// ── Unit conversion ────────────────────────────────────────────

/// °C → 0.01 °C.
pub fn temperature_units(v: SensorValue) -> i16 {
    v.to_centi().clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

/// %RH → 0.01 %.
pub fn humidity_units(v: SensorValue) -> u16 {
    v.to_centi().clamp(0, i64::from(u16::MAX)) as u16
}

/// lux → lux, fraction dropped.
pub fn illuminance_units(v: SensorValue) -> u16 {
    v.val1.clamp(0, i32::from(u16::MAX)) as u16
}

/// kPa → 0.1 Pa.
pub fn pressure_units(v: SensorValue) -> u32 {
    v.to_ten_thousandths().clamp(0, i64::from(u32::MAX)) as u32
}

// ═══════════════════════════════════════════════════════════════
//  Server
// ═══════════════════════════════════════════════════════════════

pub struct GattServer<N, A> {
    notifier: N,
    advertiser: A,
    adv: AdvertisingData,
    adv_interval: u32,
    dis: DeviceInformation,
    bas: BatteryService,
    temperature: EssCharacteristic<i16>,
    humidity: EssCharacteristic<u16>,
    ambient_light: EssCharacteristic<u16>,
    pressure: EssCharacteristic<u32>,
}

impl<N: Notifier, A: Advertiser> GattServer<N, A> {
    pub fn new(notifier: N, advertiser: A, device: DeviceConfig) -> Self {
        let ess = |q: Quantity| SensorConfig::default_for(q.config_key());
        Self {
            notifier,
            advertiser,
            adv: AdvertisingData::new(DEVICE_NAME, 0),
            adv_interval: device.advertising_interval,
            dis: DeviceInformation::default(),
            bas: BatteryService::new(),
            temperature: EssCharacteristic::new(
                Quantity::Temperature,
                TEMPERATURE_RANGE,
                ess(Quantity::Temperature),
                Quantity::Temperature.description(),
            ),
            humidity: EssCharacteristic::new(
                Quantity::Humidity,
                HUMIDITY_RANGE,
                ess(Quantity::Humidity),
                Quantity::Humidity.description(),
            ),
            ambient_light: EssCharacteristic::new(
                Quantity::AmbientLight,
                AMBIENT_LIGHT_RANGE,
                ess(Quantity::AmbientLight),
                Quantity::AmbientLight.description(),
            ),
            pressure: EssCharacteristic::new(
                Quantity::Pressure,
                PRESSURE_RANGE,
                ess(Quantity::Pressure),
                Quantity::Pressure.description(),
            ),
        }
    }

    fn ess(&self, q: Quantity) -> &dyn EssAttributes {
        match q {
            Quantity::Temperature => &self.temperature,
            Quantity::Humidity => &self.humidity,
            Quantity::AmbientLight => &self.ambient_light,
            Quantity::Pressure => &self.pressure,
        }
    }

    fn ess_mut(&mut self, q: Quantity) -> &mut dyn EssAttributes {
        match q {
            Quantity::Temperature => &mut self.temperature,
            Quantity::Humidity => &mut self.humidity,
            Quantity::AmbientLight => &mut self.ambient_light,
            Quantity::Pressure => &mut self.pressure,
        }
    }

    // ── Advertising ───────────────────────────────────────────

    pub fn start_advertising(&mut self) -> Result<(), BleError> {
        self.advertiser.start(self.adv.payload(), self.adv_interval)?;
        info!(
            "GATT: advertising as '{}' every {} × 0.625 ms",
            DEVICE_NAME, self.adv_interval
        );
        Ok(())
    }

    pub fn advertising(&self) -> &AdvertisingData {
        &self.adv
    }

    // ── Attribute access ──────────────────────────────────────

    pub fn read(&self, attr: AttrId) -> Result<Vec<u8, ATTR_MAX_LEN>, BleError> {
        let mut out = Vec::new();
        let fill = |out: &mut Vec<u8, ATTR_MAX_LEN>, s: &str| {
            let n = s.len().min(ATTR_MAX_LEN);
            let _ = out.extend_from_slice(&s.as_bytes()[..n]);
        };
        match attr {
            AttrId::SoftwareRevision => fill(&mut out, self.dis.software_revision),
            AttrId::HardwareRevision => fill(&mut out, self.dis.hardware_revision),
            AttrId::BatteryLevel => {
                let _ = out.push(self.bas.level());
            }
            AttrId::BatteryCcc => {
                let _ = out.extend_from_slice(&self.bas.ccc_bytes());
            }
            AttrId::Ess(q, a) => return self.ess(q).read_attr(a),
        }
        Ok(out)
    }

    pub fn write(&mut self, attr: AttrId, data: &[u8]) -> Result<(), BleError> {
        match attr {
            AttrId::BatteryCcc => self.bas.on_ccc_write(data),
            AttrId::Ess(q, a) => self.ess_mut(q).write_attr(a, data),
            _ => Err(BleError::InvalidAttribute),
        }
    }

    /// Push the current value of `attr` to the stack's attribute cache.
    pub fn publish(&mut self, attr: AttrId) {
        if let Ok(bytes) = self.read(attr) {
            self.notifier.publish(attr, &bytes);
        }
    }

    /// Publish every attribute.  Run once the stack has registered the
    /// attribute table.
    pub fn publish_all(&mut self) {
        for attr in AttrId::all() {
            self.publish(attr);
        }
    }

    /// Replace a quantity's ES Measurement descriptor with the loaded record.
    pub fn set_measurement_config(&mut self, quantity: Quantity, cfg: SensorConfig) {
        self.ess_mut(quantity).set_measurement_config(cfg);
    }

    // ── Updates ───────────────────────────────────────────────

    pub fn update_temperature(&mut self, centi: i16) -> bool {
        self.temperature.update(centi, &mut self.notifier)
    }

    pub fn update_humidity(&mut self, centi: u16) -> bool {
        self.humidity.update(centi, &mut self.notifier)
    }

    pub fn update_ambient_light(&mut self, lux: u16) -> bool {
        self.ambient_light.update(lux, &mut self.notifier)
    }

    pub fn update_pressure(&mut self, deci_pa: u32) -> bool {
        self.pressure.update(deci_pa, &mut self.notifier)
    }

    /// New capacity: rewrite the advertised level, then update BAS.
    pub fn update_battery(&mut self, level: u8) {
        let level = level.min(100);
        if let Err(e) = self.advertiser.stop() {
            warn!("GATT: advertising stop failed ({})", e);
        }
        self.adv.set_battery_level(level);
        if let Err(e) = self.advertiser.start(self.adv.payload(), self.adv_interval) {
            warn!("GATT: advertising restart failed ({})", e);
        }
        self.bas.set_level(level, &mut self.notifier);
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn battery_level(&self) -> u8 {
        self.bas.level()
    }

    pub fn temperature(&self) -> &EssCharacteristic<i16> {
        &self.temperature
    }

    pub fn humidity(&self) -> &EssCharacteristic<u16> {
        &self.humidity
    }

    pub fn ambient_light(&self) -> &EssCharacteristic<u16> {
        &self.ambient_light
    }

    pub fn pressure(&self) -> &EssCharacteristic<u32> {
        &self.pressure
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn advertiser(&self) -> &A {
        &self.advertiser
    }
}

impl<N: Notifier, A: Advertiser> MeasurementSink for GattServer<N, A> {
    fn on_measurement(&mut self, measurement: &Measurement) {
        match *measurement {
            Measurement::TempHumidity {
                temperature,
                humidity,
            } => {
                if let Some(t) = temperature {
                    self.update_temperature(temperature_units(t));
                }
                if let Some(h) = humidity {
                    self.update_humidity(humidity_units(h));
                }
            }
            Measurement::AmbientLight(v) => {
                self.update_ambient_light(illuminance_units(v));
            }
            Measurement::Pressure(v) => {
                self.update_pressure(pressure_units(v));
            }
            Measurement::Battery(pct) => self.update_battery(pct),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigKey;

    #[derive(Default)]
    struct Notes(std::vec::Vec<AttrId>, usize);
    impl Notifier for Notes {
        fn notify(&mut self, attr: AttrId, _payload: &[u8]) -> Result<(), BleError> {
            self.0.push(attr);
            Ok(())
        }
        fn publish(&mut self, _attr: AttrId, _payload: &[u8]) {
            self.1 += 1;
        }
    }

    #[derive(Default)]
    struct Adv {
        starts: std::vec::Vec<(std::vec::Vec<u8>, u32)>,
        stops: usize,
    }
    impl Advertiser for Adv {
        fn start(&mut self, payload: &[u8], interval: u32) -> Result<(), BleError> {
            self.starts.push((payload.to_vec(), interval));
            Ok(())
        }
        fn stop(&mut self) -> Result<(), BleError> {
            self.stops += 1;
            Ok(())
        }
    }

    fn server() -> GattServer<Notes, Adv> {
        GattServer::new(Notes::default(), Adv::default(), DeviceConfig::default())
    }

    #[test]
    fn ccc_parsing() {
        assert_eq!(parse_ccc(&[0x01, 0x00]), Ok(true));
        assert_eq!(parse_ccc(&[0x00, 0x00]), Ok(false));
        assert_eq!(parse_ccc(&[0x02, 0x00]), Ok(false));
        assert_eq!(parse_ccc(&[0x01, 0x00, 0x00]), Err(BleError::InvalidAttributeLength));
    }

    #[test]
    fn unit_conversions() {
        assert_eq!(temperature_units(SensorValue::from_centi(-1_234)), -1_234);
        assert_eq!(humidity_units(SensorValue::from_centi(4_500)), 4_500);
        assert_eq!(humidity_units(SensorValue::from_centi(-5)), 0);
        assert_eq!(illuminance_units(SensorValue::new(70_000, 0)), u16::MAX);
        assert_eq!(pressure_units(SensorValue::from_milli(101_325)), 1_013_250);
    }

    #[test]
    fn battery_update_restarts_advertising() {
        let mut g = server();
        g.update_battery(42);
        assert_eq!(g.advertiser().stops, 1);
        let (payload, interval) = g.advertiser().starts.last().unwrap().clone();
        assert_eq!(*payload.last().unwrap(), 42);
        assert_eq!(interval, 1_600);
        assert_eq!(g.advertising().battery_level(), 42);
        assert_eq!(g.read(AttrId::BatteryLevel).unwrap().as_slice(), &[42]);
    }

    #[test]
    fn measurement_is_routed_by_quantity() {
        let mut g = server();
        g.write(AttrId::Ess(Quantity::Pressure, EssAttr::Ccc), &[0x01, 0x00])
            .unwrap();
        g.on_measurement(&Measurement::Pressure(SensorValue::from_milli(101_325)));
        assert_eq!(g.pressure().value(), 1_013_250);
        assert_eq!(
            g.notifier().0,
            vec![AttrId::Ess(Quantity::Pressure, EssAttr::Value)]
        );
    }

    #[test]
    fn partial_temp_humidity_updates_one_characteristic() {
        let mut g = server();
        g.on_measurement(&Measurement::TempHumidity {
            temperature: None,
            humidity: Some(SensorValue::from_centi(5_000)),
        });
        assert_eq!(g.humidity().value(), 5_000);
        assert_eq!(g.temperature().value(), 0);
    }

    #[test]
    fn read_only_attributes_reject_writes() {
        let mut g = server();
        assert_eq!(
            g.write(AttrId::SoftwareRevision, b"x"),
            Err(BleError::InvalidAttribute)
        );
        assert_eq!(
            g.read(AttrId::Ess(Quantity::AmbientLight, EssAttr::UserDescription))
                .unwrap()
                .as_slice(),
            b"Ambient Light Sensor"
        );
    }

    #[test]
    fn valid_range_uses_value_width() {
        let g = server();
        let range = |q| g.read(AttrId::Ess(q, EssAttr::ValidRange)).unwrap();
        // 30 000.0 Pa and 110 000.0 Pa in 0.1 Pa steps do not fit in 16 bits
        assert_eq!(
            range(Quantity::Pressure).as_slice(),
            &[0xE0, 0x93, 0x04, 0x00, 0xE0, 0xC8, 0x10, 0x00]
        );
        assert_eq!(range(Quantity::Temperature).len(), 4);
        assert_eq!(range(Quantity::Humidity).as_slice(), &[0x00, 0x00, 0x10, 0x27]);
        assert_eq!(range(Quantity::AmbientLight).as_slice(), &[0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn loaded_config_reaches_descriptor() {
        let mut g = server();
        let cfg = SensorConfig {
            update_interval: 0x01_0203,
            ..SensorConfig::default_for(ConfigKey::Humidity)
        };
        g.set_measurement_config(Quantity::Humidity, cfg);
        let bytes = g
            .read(AttrId::Ess(Quantity::Humidity, EssAttr::Measurement))
            .unwrap();
        assert_eq!(&bytes[6..9], &[0x03, 0x02, 0x01]);
    }

    #[test]
    fn publish_all_covers_every_attribute() {
        let mut g = server();
        assert_eq!(AttrId::all().count(), 4 + 4 * EssAttr::ALL.len());
        g.publish_all();
        assert_eq!(g.notifier().1, 28);
    }
}
