//! Hardware adapter: bridges board peripherals to the driver and port layers.
//!
//! - [`VbatAdc`] implements [`BatteryAdc`] over ADC1 oneshot.
//! - [`sensor_bus`] builds the power-gated I²C bus from the pins in
//!   [`crate::pins`].
//!
//! On non-espidf targets the ADC is a simulation stub whose raw reading
//! tests set through [`sim_set_vbat_raw`].

use crate::app::ports::BatteryAdc;
use crate::error::SensorError;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use crate::pins;

/// Simulated 10-bit battery reading (2.70 V).
#[cfg(not(target_os = "espidf"))]
static SIM_VBAT_RAW: AtomicU16 = AtomicU16::new(768);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_vbat_raw(raw: u16) {
    SIM_VBAT_RAW.store(raw, Ordering::Relaxed);
}

/// Battery voltage divider tap on ADC1.
pub struct VbatAdc {
    #[cfg(target_os = "espidf")]
    handle: adc_oneshot_unit_handle_t,
}

impl VbatAdc {
    /// Create the ADC1 oneshot unit and configure the battery channel for
    /// 12 dB attenuation, 12-bit width.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Result<Self, SensorError> {
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        // SAFETY: called once from the main task at boot.
        let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
        if ret != ESP_OK {
            log::error!("VbatAdc: ADC1 init failed (rc={})", ret);
            return Err(SensorError::AdcReadFailed);
        }

        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        let ret = unsafe { adc_oneshot_config_channel(handle, pins::VBAT_ADC_CHANNEL, &chan_cfg) };
        if ret != ESP_OK {
            log::error!("VbatAdc: channel config failed (rc={})", ret);
            return Err(SensorError::AdcReadFailed);
        }
        log::info!("VbatAdc: ADC1 CH{} configured", pins::VBAT_ADC_CHANNEL);
        Ok(Self { handle })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, SensorError> {
        log::info!("VbatAdc: simulation backend");
        Ok(Self {})
    }
}

impl BatteryAdc for VbatAdc {
    /// 12-bit conversion scaled down to 10 bits.
    #[cfg(target_os = "espidf")]
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        let mut raw: i32 = 0;
        // SAFETY: handle is valid for the adapter's lifetime; single caller.
        let ret = unsafe { adc_oneshot_read(self.handle, pins::VBAT_ADC_CHANNEL, &mut raw) };
        if ret != ESP_OK {
            return Err(SensorError::AdcReadFailed);
        }
        Ok((raw.max(0) as u16) >> 2)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        Ok(SIM_VBAT_RAW.load(Ordering::Relaxed))
    }
}

// ── Sensor bus ────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub type SensorBus = crate::drivers::power_bus::PowerGatedBus<
    esp_idf_hal::i2c::I2cDriver<'static>,
    esp_idf_hal::gpio::PinDriver<'static, esp_idf_hal::gpio::AnyOutputPin, esp_idf_hal::gpio::Output>,
    esp_idf_hal::delay::FreeRtos,
>;

/// I²C master on the sensor pins plus the rail-enable output.
#[cfg(target_os = "espidf")]
pub fn sensor_bus(i2c: esp_idf_hal::i2c::I2C0) -> Result<SensorBus, EspError> {
    use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::units::Hertz;

    // SAFETY: pin numbers come from the board map and are claimed nowhere else.
    let (sda, scl, rail) = unsafe {
        (
            AnyIOPin::new(pins::I2C_SDA_GPIO),
            AnyIOPin::new(pins::I2C_SCL_GPIO),
            AnyOutputPin::new(pins::SENSOR_POWER_GPIO),
        )
    };
    let config = I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ));
    let i2c = I2cDriver::new(i2c, sda, scl, &config)?;
    let rail = PinDriver::output(rail)?;
    log::info!(
        "sensor bus: I2C0 SDA={} SCL={} @ {} Hz, rail GPIO{}",
        pins::I2C_SDA_GPIO,
        pins::I2C_SCL_GPIO,
        pins::I2C_FREQ_HZ,
        pins::SENSOR_POWER_GPIO
    );
    Ok(crate::drivers::power_bus::PowerGatedBus::new(
        i2c,
        rail,
        esp_idf_hal::delay::FreeRtos,
    ))
}
