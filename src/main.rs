//! EnvNode Firmware: Main Entry Point
//!
//! Hexagonal architecture with a polled scheduler and one FIFO work queue.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter    VbatAdc      PowerGatedBus   Esp32TimeAdapter   │
//! │  (KvStore)     (BatteryAdc) (SharedBus)     (Clock)            │
//! │  BleAdapter ─▶ BleNotifier (Notifier) · BleAdvertiser          │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  NodeService: Scheduler · WorkQueue · channels         │    │
//! │  │        │ Measurement                                   │    │
//! │  │        ▼                                               │    │
//! │  │  LogTap ─▶ GattServer (DIS · BAS · ESS · advertising)  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::peripherals::Peripherals;
use log::{error, info, warn};

use envnode::adapters::ble::{self, BleAdapter, BleState};
use envnode::adapters::hardware::{self, VbatAdc};
use envnode::adapters::log_sink::LogTap;
use envnode::adapters::nvs::NvsAdapter;
use envnode::adapters::time::Esp32TimeAdapter;
use envnode::app::channels::{FuelGaugeChannel, SingleChannel, TempHumidityChannel};
use envnode::app::config_store::ConfigStore;
use envnode::app::ports::Clock;
use envnode::app::service::NodeService;
use envnode::config::{DEVICE_NAME, DeviceConfig, MAIN_LOOP_IDLE_MS};
use envnode::events::WORK_QUEUE;
use envnode::gatt::GattServer;
use envnode::sensors::bmp280::Bmp280;
use envnode::sensors::si7020::Si7020;
use envnode::sensors::tsl4531::Tsl4531;

/// Upper bound on waiting for the attribute table to register.
const BLE_READY_TIMEOUT_MS: u32 = 2_000;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  EnvNode v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let clock = Esp32TimeAdapter::new();
    let peripherals = Peripherals::take()?;

    // ── 2. Persistent configuration ───────────────────────────
    let nvs = NvsAdapter::new()
        .map_err(|e| anyhow::anyhow!("NVS init failed: {e}"))?;
    let mut store = ConfigStore::new(nvs);
    let device = store.load_or_seed_device(DeviceConfig::default());

    // ── 3. Hardware ───────────────────────────────────────────
    let bus = hardware::sensor_bus(peripherals.i2c0)?;

    // ── 4. BLE stack + GATT model ─────────────────────────────
    let mut stack = BleAdapter::new(DEVICE_NAME);
    if let Err(e) = stack.start() {
        error!("BLE unavailable ({}), measuring without a radio", e);
    }
    let mut gatt = GattServer::new(stack.notifier(), stack.advertiser(), device);

    // ── 5. Channels ───────────────────────────────────────────
    let mut service = NodeService::new(&WORK_QUEUE);
    let now = clock.now_ms();
    service.register_result(
        TempHumidityChannel::init(Si7020::new(&bus, FreeRtos), &mut store),
        now,
    );
    service.register_result(
        SingleChannel::ambient_light(Tsl4531::new(&bus, FreeRtos), &mut store),
        now,
    );
    service.register_result(
        SingleChannel::pressure(Bmp280::new(&bus, FreeRtos), &mut store),
        now,
    );
    match VbatAdc::new() {
        Ok(adc) => service.register(FuelGaugeChannel::init(adc), now),
        Err(e) => error!("fuel gauge disabled ({})", e),
    }
    for (quantity, cfg) in service.measurement_configs() {
        gatt.set_measurement_config(quantity, cfg);
    }
    service.log_summary();

    // ── 6. Publish attributes and advertise ───────────────────
    let mut waited = 0;
    while stack.state() == BleState::Registering && waited < BLE_READY_TIMEOUT_MS {
        FreeRtos::delay_ms(10);
        waited += 10;
    }
    if stack.state() == BleState::Ready {
        gatt.publish_all();
        if let Err(e) = gatt.start_advertising() {
            warn!("advertising start failed ({})", e);
        }
    } else {
        warn!("BLE not ready after {} ms ({:?})", waited, stack.state());
    }

    info!("System ready. Entering main loop.");

    // ── 7. Main loop ──────────────────────────────────────────
    loop {
        let now = clock.now_ms();
        service.poll_timers(now);
        service.run_pending(&mut LogTap::new(&mut gatt));

        while let Some((attr, data)) = ble::take_write() {
            if let Err(e) = gatt.write(attr, &data) {
                warn!("BLE: rejected write to {:?} ({})", attr, e);
            }
            gatt.publish(attr);
        }

        let idle = service
            .next_deadline_ms()
            .map_or(u64::from(MAIN_LOOP_IDLE_MS), |d| d.saturating_sub(clock.now_ms()))
            .min(u64::from(MAIN_LOOP_IDLE_MS));
        if idle > 0 {
            FreeRtos::delay_ms(idle as u32);
        }
    }
}
