//! Measurement pipeline: timer → work queue → driver → GATT model → BLE
//! stack, with the rail and bus timeline checked on the mock board.

use envnode::adapters::log_sink::LogTap;
use envnode::adapters::nvs::NvsAdapter;
use envnode::app::channels::{FuelGaugeChannel, SingleChannel, TempHumidityChannel};
use envnode::app::config_store::ConfigStore;
use envnode::app::events::Quantity;
use envnode::app::service::NodeService;
use envnode::config::DeviceConfig;
use envnode::error::BleError;
use envnode::events::WorkQueue;
use envnode::gatt::{AttrId, EssAttr, GattServer};
use envnode::sensors::bmp280::Bmp280;
use envnode::sensors::si7020::Si7020;
use envnode::sensors::tsl4531::Tsl4531;

use crate::mock_hw::{AdvCall, HwEvent, MockAdc, MockAdvertiser, MockBoard, MockNotifier};

type Gatt = GattServer<MockNotifier, MockAdvertiser>;

fn gatt() -> Gatt {
    GattServer::new(
        MockNotifier::default(),
        MockAdvertiser::default(),
        DeviceConfig::default(),
    )
}

fn subscribe(gatt: &mut Gatt, quantity: Quantity) {
    gatt.write(AttrId::Ess(quantity, EssAttr::Ccc), &[0x01, 0x00])
        .unwrap();
}

fn notified(gatt: &Gatt, quantity: Quantity) -> Vec<Vec<u8>> {
    gatt.notifier()
        .notified
        .iter()
        .filter(|(attr, _)| *attr == AttrId::Ess(quantity, EssAttr::Value))
        .map(|(_, bytes)| bytes.clone())
        .collect()
}

// ── Temperature / humidity ────────────────────────────────────

#[test]
fn temperature_notifies_only_when_the_value_changes() {
    let board = MockBoard::new();
    // 20.01 °C
    board.install_si7020(0x7C80, 0x6168);
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());
    let mut svc = NodeService::new(&queue);
    svc.register_result(
        TempHumidityChannel::init(Si7020::new(&bus, board.delay()), &mut store),
        0,
    );

    let mut gatt = gatt();
    subscribe(&mut gatt, Quantity::Temperature);

    let mut run_at = |now: u64, gatt: &mut Gatt| {
        assert_eq!(svc.poll_timers(now), 1);
        assert_eq!(svc.run_pending(&mut LogTap::new(gatt)), 1);
    };

    run_at(5_000, &mut gatt);
    run_at(65_000, &mut gatt);
    // 20.05 °C
    board.set_si7020_codes(0x7C80, 0x6178);
    run_at(125_000, &mut gatt);

    assert_eq!(
        notified(&gatt, Quantity::Temperature),
        vec![2_001i16.to_le_bytes().to_vec(), 2_005i16.to_le_bytes().to_vec()]
    );
    // humidity changed too, but nobody subscribed
    assert!(notified(&gatt, Quantity::Humidity).is_empty());
    assert_eq!(gatt.humidity().value(), 5_479);
    assert_eq!(
        gatt.notifier().cache[&AttrId::Ess(Quantity::Humidity, EssAttr::Value)],
        5_479u16.to_le_bytes().to_vec()
    );
    assert!(!board.rail_is_high());
}

#[test]
fn failed_temperature_read_back_still_updates_humidity() {
    let board = MockBoard::new();
    board.install_si7020(0x7C80, 0x6178);
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());
    let mut svc = NodeService::new(&queue);
    svc.register_result(
        TempHumidityChannel::init(Si7020::new(&bus, board.delay()), &mut store),
        0,
    );
    board.fail_register(0x40, 0xE0);

    let mut gatt = gatt();
    subscribe(&mut gatt, Quantity::Temperature);
    subscribe(&mut gatt, Quantity::Humidity);
    svc.poll_timers(5_000);
    svc.run_pending(&mut gatt);

    assert_eq!(gatt.humidity().value(), 5_479);
    assert_eq!(gatt.temperature().value(), 0);
    assert_eq!(notified(&gatt, Quantity::Humidity).len(), 1);
    assert!(notified(&gatt, Quantity::Temperature).is_empty());
    assert!(!board.rail_is_high());
}

// ── Ambient light ─────────────────────────────────────────────

#[test]
fn light_conversion_holds_the_rail_until_the_data_read() {
    let board = MockBoard::new();
    board.install_tsl4531(310);
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());
    let mut svc = NodeService::new(&queue);
    svc.register_result(
        SingleChannel::ambient_light(Tsl4531::new(&bus, board.delay()), &mut store),
        0,
    );
    board.clear_events();

    let mut gatt = gatt();
    assert_eq!(svc.poll_timers(1_000), 1);
    svc.run_pending(&mut gatt);

    assert_eq!(
        board.events(),
        vec![
            HwEvent::RailHigh,
            HwEvent::DelayMs(1),
            HwEvent::Write(0x29, vec![0x80, 0x02]),
            HwEvent::DelayMs(420),
            HwEvent::RailHigh,
            HwEvent::DelayMs(1),
            HwEvent::WriteRead(0x29, 0x84, 2),
            HwEvent::RailLow,
        ]
    );
    assert_eq!(gatt.ambient_light().value(), 310);
    assert!(bus.permit().is_full());
}

#[test]
fn failed_light_start_still_drops_the_rail() {
    let board = MockBoard::new();
    board.install_tsl4531(310);
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());
    let mut svc = NodeService::new(&queue);
    svc.register_result(
        SingleChannel::ambient_light(Tsl4531::new(&bus, board.delay()), &mut store),
        0,
    );
    board.remove_device(0x29);
    board.clear_events();

    let mut gatt = gatt();
    svc.poll_timers(1_000);
    svc.run_pending(&mut gatt);

    assert_eq!(
        board.events(),
        vec![HwEvent::RailHigh, HwEvent::DelayMs(1), HwEvent::RailLow]
    );
    assert!(!board.rail_is_high());
    assert!(bus.permit().is_full());
    assert_eq!(gatt.ambient_light().value(), 0);
}

// ── Pressure ──────────────────────────────────────────────────

#[test]
fn pressure_reaches_the_characteristic_in_tenths_of_a_pascal() {
    let board = MockBoard::new();
    board.install_bmp280();
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());
    let mut svc = NodeService::new(&queue);
    svc.register_result(
        SingleChannel::pressure(Bmp280::new(&bus, board.delay()), &mut store),
        0,
    );
    board.clear_events();

    let mut gatt = gatt();
    subscribe(&mut gatt, Quantity::Pressure);
    svc.poll_timers(1_000);
    svc.run_pending(&mut LogTap::new(&mut gatt));

    assert_eq!(gatt.pressure().value(), 1_006_532);
    assert_eq!(
        notified(&gatt, Quantity::Pressure),
        vec![1_006_532u32.to_le_bytes().to_vec()]
    );

    // config + forced start under one permit, rail dropped only after the data read
    let events = board.events();
    let lows: Vec<_> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| **e == HwEvent::RailLow)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(lows, vec![events.len() - 1]);
    assert!(events.contains(&HwEvent::Write(0x76, vec![0xF4, 0x2D])));
    assert!(events.contains(&HwEvent::DelayMs(20)));
    assert_eq!(events[events.len() - 2], HwEvent::WriteRead(0x76, 0xF7, 6));
}

// ── Battery ───────────────────────────────────────────────────

#[test]
fn battery_level_is_advertised_and_served() {
    let queue = WorkQueue::new();
    let mut svc = NodeService::new(&queue);
    svc.register(FuelGaugeChannel::init(MockAdc(765)), 0);

    let mut gatt = gatt();
    gatt.start_advertising().unwrap();
    gatt.write(AttrId::BatteryCcc, &[0x01, 0x00]).unwrap();

    assert_eq!(svc.poll_timers(4_999), 0);
    assert_eq!(svc.poll_timers(5_000), 1);
    svc.run_pending(&mut gatt);

    let calls = &gatt.advertiser().calls;
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1], AdvCall::Stop);
    assert_eq!(gatt.advertiser().running().and_then(|p| p.last().copied()), Some(42));
    assert_eq!(gatt.read(AttrId::BatteryLevel).unwrap().as_slice(), &[42]);
    assert!(
        gatt.notifier()
            .notified
            .contains(&(AttrId::BatteryLevel, vec![42]))
    );
    assert_eq!(svc.next_deadline_ms(), Some(125_000));
}

// ── Client writes ─────────────────────────────────────────────

#[test]
fn client_cannot_rewrite_the_trigger_setting() {
    let board = MockBoard::new();
    board.install_si7020(0x7C80, 0x6178);
    let bus = board.bus();
    let queue = WorkQueue::new();
    let mut store = ConfigStore::new(NvsAdapter::new().unwrap());
    let mut svc = NodeService::new(&queue);
    svc.register_result(
        TempHumidityChannel::init(Si7020::new(&bus, board.delay()), &mut store),
        0,
    );

    let mut gatt = gatt();
    subscribe(&mut gatt, Quantity::Temperature);
    let attr = AttrId::Ess(Quantity::Temperature, EssAttr::TriggerSetting);
    // inactive would silence every subscriber
    assert_eq!(gatt.write(attr, &[0x00]), Err(BleError::InvalidAttribute));
    assert_eq!(gatt.read(attr).unwrap().as_slice(), &[0x03]);

    svc.poll_timers(5_000);
    svc.run_pending(&mut gatt);

    assert_eq!(gatt.temperature().value(), 2_005);
    assert_eq!(
        notified(&gatt, Quantity::Temperature),
        vec![2_005i16.to_le_bytes().to_vec()]
    );
}
