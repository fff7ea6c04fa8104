//! Boot sequence: configuration seeding, driver binding, timer arming and
//! the first advertising payload.

use envnode::adapters::nvs::NvsAdapter;
use envnode::app::channels::{FuelGaugeChannel, SingleChannel, TempHumidityChannel};
use envnode::app::config_store::ConfigStore;
use envnode::app::ports::KvStore;
use envnode::app::service::NodeService;
use envnode::config::{ConfigKey, DeviceConfig, SensorConfig};
use envnode::error::Error;
use envnode::events::{ChannelId, WorkQueue};
use envnode::gatt::{AttrId, GattServer};
use envnode::scheduler::TimerState;
use envnode::sensors::bmp280::Bmp280;
use envnode::sensors::si7020::Si7020;
use envnode::sensors::tsl4531::Tsl4531;

use crate::mock_hw::{AdvCall, BrokenStore, HwEvent, MockAdc, MockAdvertiser, MockBoard, MockNotifier};

fn full_board() -> MockBoard {
    let board = MockBoard::new();
    board.install_si7020(0x7C80, 0x6178);
    board.install_tsl4531(310);
    board.install_bmp280();
    board
}

// ── Storage seeding ───────────────────────────────────────────

#[test]
fn empty_storage_boot_seeds_defaults_and_arms_timers() {
    let board = full_board();
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());

    let device = store.load_or_seed_device(DeviceConfig::default());
    assert_eq!(device.advertising_interval, 1_600);
    assert!(store.inner().exists(ConfigKey::Device.id()));

    let mut svc = NodeService::new(&queue);
    assert!(svc.register_result(
        TempHumidityChannel::init(Si7020::new(&bus, board.delay()), &mut store),
        0,
    ));

    assert!(store.inner().exists(ConfigKey::Humidity.id()));
    assert!(store.inner().exists(ConfigKey::Temperature.id()));
    assert_eq!(
        store.sensor_config(ConfigKey::Humidity),
        Ok(SensorConfig::default_for(ConfigKey::Humidity))
    );
    assert_eq!(svc.period_ms(ChannelId::TempHumidity), Some(60_000));
    assert_eq!(svc.timer_state(ChannelId::TempHumidity), TimerState::Armed);
    assert_eq!(svc.next_deadline_ms(), Some(5_000));
}

#[test]
fn stored_interval_sets_the_timer_period() {
    let board = full_board();
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());
    let custom = SensorConfig {
        update_interval: 30,
        ..SensorConfig::default_for(ConfigKey::Pressure)
    };
    store.set_sensor_config(ConfigKey::Pressure, &custom).unwrap();

    let mut svc = NodeService::new(&queue);
    svc.register_result(SingleChannel::pressure(Bmp280::new(&bus, board.delay()), &mut store), 0);

    assert_eq!(svc.period_ms(ChannelId::Pressure), Some(30_000));
    let configs: Vec<_> = svc.measurement_configs().collect();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].1, custom);
}

#[test]
fn storage_io_error_falls_back_to_defaults() {
    let board = full_board();
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(BrokenStore::default());

    let device = store.load_or_seed_device(DeviceConfig::default());
    assert_eq!(device, DeviceConfig::default());

    let mut svc = NodeService::new(&queue);
    assert!(svc.register_result(
        TempHumidityChannel::init(Si7020::new(&bus, board.delay()), &mut store),
        0,
    ));
    assert_eq!(svc.period_ms(ChannelId::TempHumidity), Some(60_000));
    assert_eq!(store.inner().writes, 0);
}

// ── Driver binding ────────────────────────────────────────────

#[test]
fn missing_light_sensor_disables_only_its_channel() {
    let board = full_board();
    board.remove_device(0x29);
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());

    let mut svc = NodeService::new(&queue);
    svc.register_result(
        TempHumidityChannel::init(Si7020::new(&bus, board.delay()), &mut store),
        0,
    );
    let light = SingleChannel::ambient_light(Tsl4531::new(&bus, board.delay()), &mut store);
    assert!(matches!(light, Err(Error::DeviceBinding("TSL4531"))));
    assert!(!svc.register_result(light, 0));
    svc.register_result(SingleChannel::pressure(Bmp280::new(&bus, board.delay()), &mut store), 0);
    svc.register(FuelGaugeChannel::init(MockAdc(765)), 0);

    assert!(!svc.is_enabled(ChannelId::AmbientLight));
    assert_eq!(svc.timer_state(ChannelId::AmbientLight), TimerState::Uninitialized);
    assert!(svc.is_enabled(ChannelId::TempHumidity));
    assert!(svc.is_enabled(ChannelId::Pressure));
    assert!(svc.is_enabled(ChannelId::FuelGauge));
    assert!(!store.inner().exists(ConfigKey::AmbientLight.id()));
    assert_eq!(svc.measurement_configs().count(), 3);
    assert!(!board.rail_is_high());
}

#[test]
fn wrong_humidity_chip_id_is_a_binding_error() {
    let board = full_board();
    board.set_read(0x40, &[0x15, 0, 0, 0, 0, 0]);
    let bus = board.bus();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());

    let th = TempHumidityChannel::init(Si7020::new(&bus, board.delay()), &mut store);
    assert!(matches!(th, Err(Error::DeviceBinding("SI7020"))));
    assert!(!store.inner().exists(ConfigKey::Humidity.id()));
}

#[test]
fn humidity_probe_resets_identifies_and_configures() {
    let board = full_board();
    let bus = board.bus();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());
    board.clear_events();

    let _th = TempHumidityChannel::init(Si7020::new(&bus, board.delay()), &mut store).unwrap();

    let transfers: Vec<_> = board
        .events()
        .into_iter()
        .filter(|e| !matches!(e, HwEvent::RailHigh | HwEvent::RailLow | HwEvent::DelayMs(1)))
        .collect();
    assert_eq!(
        transfers[..5],
        [
            HwEvent::Write(0x40, vec![0xFE]),
            HwEvent::DelayMs(80),
            HwEvent::Write(0x40, vec![0xFC, 0xC9]),
            HwEvent::Read(0x40, 6),
            HwEvent::Write(0x40, vec![0xE6, 0x00]),
        ]
    );
    // warm-up conversion follows the probe
    assert_eq!(transfers[5], HwEvent::Write(0x40, vec![0xF5]));
}

// ── Advertising ───────────────────────────────────────────────

#[test]
fn boot_advertises_name_and_zero_battery() {
    let device = DeviceConfig::default();
    let mut gatt = GattServer::new(MockNotifier::default(), MockAdvertiser::default(), device);
    gatt.publish_all();
    gatt.start_advertising().unwrap();

    let calls = &gatt.advertiser().calls;
    assert_eq!(calls.len(), 1);
    let AdvCall::Start(payload, interval) = &calls[0] else {
        panic!("expected a start, got {:?}", calls[0]);
    };
    assert_eq!(*interval, 1_600);
    assert!(payload.windows(7).any(|w| w == b"EnvNode"));
    assert_eq!(payload[payload.len() - 4..], [0x16, 0x0F, 0x18, 0x00]);

    // every attribute reached the stack cache
    assert_eq!(gatt.notifier().cache.len(), AttrId::all().count());
    assert_eq!(gatt.notifier().cache[&AttrId::BatteryLevel], vec![0]);
}
