//! Measurement channel contexts.
//!
//! One context per periodic measurement: it owns its driver, the
//! configuration loaded at init and the work handler the service runs when
//! the channel's timer fires.
//!
//! | Channel        | Driver     | Keys | First | Period                     |
//! |----------------|------------|------|-------|----------------------------|
//! | temp-humidity  | Si7020     | 1, 2 | 5 s   | humidity `update_interval` |
//! | ambient-light  | TSL4531    | 3    | 1 s   | `update_interval`          |
//! | pressure       | BMP280     | 4    | 1 s   | `update_interval`          |
//! | fuel-gauge     | ADC        | none | 5 s   | 120 s                      |
//!
//! A failed fetch or channel read is logged and skips that period; the
//! timer keeps running.

use log::{info, warn};

use crate::config::{
    AMBIENT_LIGHT_INITIAL_DELAY_MS, FUEL_GAUGE_INITIAL_DELAY_MS, FUEL_GAUGE_PERIOD_MS,
    PRESSURE_INITIAL_DELAY_MS, SensorConfig, TEMP_HUMIDITY_INITIAL_DELAY_MS,
};
use crate::error;
use crate::events::ChannelId;
use crate::sensors::fuel_gauge::FuelGauge;
use crate::sensors::{self, Sensor, SensorChannel, SensorValue};

use super::config_store::ConfigStore;
use super::events::{Measurement, Quantity};
use super::ports::{BatteryAdc, KvStore, MeasurementSink};

/// A periodically measured channel.
pub trait MeasurementChannel {
    fn id(&self) -> ChannelId;

    fn initial_delay_ms(&self) -> u64;

    fn period_ms(&self) -> u64;

    /// Measurement descriptors of the quantities this channel reports.
    fn configs(&self) -> &[(Quantity, SensorConfig)];

    /// Work handler: fetch, read channels, report.
    fn measure(&mut self, sink: &mut dyn MeasurementSink);
}

fn load(store: &mut ConfigStore<impl KvStore>, quantity: Quantity) -> (Quantity, SensorConfig) {
    let key = quantity.config_key();
    (quantity, store.load_or_seed_sensor(key, SensorConfig::default_for(key)))
}

fn read_channel(sensor: &impl Sensor, channel: SensorChannel) -> Option<SensorValue> {
    sensor
        .channel_get(channel)
        .inspect_err(|e| warn!("{}: {:?} read failed ({})", sensor.name(), channel, e))
        .ok()
}

// ── Temperature + humidity ─────────────────────────────────────

pub struct TempHumidityChannel<S> {
    sensor: S,
    configs: [(Quantity, SensorConfig); 2],
}

impl<S: Sensor> TempHumidityChannel<S> {
    /// Bind the driver, run the warm-up conversion and load both records.
    pub fn init(sensor: S, store: &mut ConfigStore<impl KvStore>) -> error::Result<Self> {
        let mut sensor = sensors::bind(sensor)?;

        // The first conversion after power-up reads high; discard it.
        if let Err(e) = sensor.sample_fetch() {
            warn!("{}: warm-up fetch failed ({})", sensor.name(), e);
        }

        let humidity = load(store, Quantity::Humidity);
        let temperature = load(store, Quantity::Temperature);
        Ok(Self {
            sensor,
            configs: [temperature, humidity],
        })
    }
}

impl<S: Sensor> MeasurementChannel for TempHumidityChannel<S> {
    fn id(&self) -> ChannelId {
        ChannelId::TempHumidity
    }

    fn initial_delay_ms(&self) -> u64 {
        TEMP_HUMIDITY_INITIAL_DELAY_MS
    }

    /// Both quantities come from one conversion, paced by humidity.
    fn period_ms(&self) -> u64 {
        self.configs[1].1.update_interval_ms()
    }

    fn configs(&self) -> &[(Quantity, SensorConfig)] {
        &self.configs
    }

    fn measure(&mut self, sink: &mut dyn MeasurementSink) {
        if let Err(e) = self.sensor.sample_fetch() {
            warn!("{}: fetch failed ({}), skipping period", self.sensor.name(), e);
            return;
        }
        let temperature = read_channel(&self.sensor, SensorChannel::AmbientTemp);
        let humidity = read_channel(&self.sensor, SensorChannel::Humidity);
        if temperature.is_none() && humidity.is_none() {
            return;
        }
        sink.on_measurement(&Measurement::TempHumidity {
            temperature,
            humidity,
        });
    }
}

// ── Single-quantity channels ───────────────────────────────────

/// Ambient light or barometric pressure.
pub struct SingleChannel<S> {
    sensor: S,
    id: ChannelId,
    channel: SensorChannel,
    initial_delay_ms: u64,
    configs: [(Quantity, SensorConfig); 1],
}

impl<S: Sensor> SingleChannel<S> {
    pub fn ambient_light(sensor: S, store: &mut ConfigStore<impl KvStore>) -> error::Result<Self> {
        Self::init(
            sensor,
            store,
            ChannelId::AmbientLight,
            SensorChannel::Light,
            Quantity::AmbientLight,
            AMBIENT_LIGHT_INITIAL_DELAY_MS,
        )
    }

    pub fn pressure(sensor: S, store: &mut ConfigStore<impl KvStore>) -> error::Result<Self> {
        Self::init(
            sensor,
            store,
            ChannelId::Pressure,
            SensorChannel::Pressure,
            Quantity::Pressure,
            PRESSURE_INITIAL_DELAY_MS,
        )
    }

    fn init(
        sensor: S,
        store: &mut ConfigStore<impl KvStore>,
        id: ChannelId,
        channel: SensorChannel,
        quantity: Quantity,
        initial_delay_ms: u64,
    ) -> error::Result<Self> {
        let sensor = sensors::bind(sensor)?;
        Ok(Self {
            sensor,
            id,
            channel,
            initial_delay_ms,
            configs: [load(store, quantity)],
        })
    }
}

impl<S: Sensor> MeasurementChannel for SingleChannel<S> {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn initial_delay_ms(&self) -> u64 {
        self.initial_delay_ms
    }

    fn period_ms(&self) -> u64 {
        self.configs[0].1.update_interval_ms()
    }

    fn configs(&self) -> &[(Quantity, SensorConfig)] {
        &self.configs
    }

    fn measure(&mut self, sink: &mut dyn MeasurementSink) {
        if let Err(e) = self.sensor.sample_fetch() {
            warn!("{}: fetch failed ({}), skipping period", self.sensor.name(), e);
            return;
        }
        let Some(value) = read_channel(&self.sensor, self.channel) else {
            return;
        };
        let measurement = match self.configs[0].0 {
            Quantity::AmbientLight => Measurement::AmbientLight(value),
            Quantity::Pressure => Measurement::Pressure(value),
            Quantity::Temperature | Quantity::Humidity => return,
        };
        sink.on_measurement(&measurement);
    }
}

// ── Fuel gauge ─────────────────────────────────────────────────

pub struct FuelGaugeChannel<A> {
    gauge: FuelGauge<A>,
}

impl<A: BatteryAdc> FuelGaugeChannel<A> {
    /// Prime the averaging filter with one sample.
    pub fn init(adc: A) -> Self {
        let mut gauge = FuelGauge::new(adc);
        match gauge.sample_fetch() {
            Ok(()) => info!("FG: primed at {:?} mV", gauge.average_mv()),
            Err(e) => warn!("FG: priming sample failed ({})", e),
        }
        Self { gauge }
    }

    pub fn gauge(&self) -> &FuelGauge<A> {
        &self.gauge
    }
}

impl<A: BatteryAdc> MeasurementChannel for FuelGaugeChannel<A> {
    fn id(&self) -> ChannelId {
        ChannelId::FuelGauge
    }

    fn initial_delay_ms(&self) -> u64 {
        FUEL_GAUGE_INITIAL_DELAY_MS
    }

    fn period_ms(&self) -> u64 {
        FUEL_GAUGE_PERIOD_MS
    }

    fn configs(&self) -> &[(Quantity, SensorConfig)] {
        &[]
    }

    fn measure(&mut self, sink: &mut dyn MeasurementSink) {
        if self.gauge.sample_fetch().is_err() {
            return;
        }
        if let Some(pct) = self.gauge.capacity() {
            sink.on_measurement(&Measurement::Battery(pct));
        }
    }
}
