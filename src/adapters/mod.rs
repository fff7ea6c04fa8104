//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                |
//! |----------------|--------------------|----------------------------|
//! | `ble`          | Notifier           | Bluedroid GATT server      |
//! |                | Advertiser         | Bluedroid GAP              |
//! | `hardware`     | BatteryAdc         | ESP32 ADC1 oneshot         |
//! |                | SharedBus (build)  | I²C0 + sensor rail GPIO    |
//! | `log_sink`     | MeasurementSink    | Serial log output          |
//! | `nvs`          | KvStore            | NVS / in-memory store      |
//! | `time`         | Clock              | ESP32 high-resolution timer|

pub mod ble;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
