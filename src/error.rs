//! Unified error types for the EnvNode firmware.
//!
//! A single `Error` enum that every subsystem can convert into, so the
//! work handlers and the boot sequence handle failures the same way.
//! All variants are `Copy` so they can be logged and passed around the
//! work queue without allocation.
//!
//! None of these are fatal: a failed measurement skips one period, a
//! failed binding disables one channel, a failed storage read falls back
//! to compiled-in defaults.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An I2C transaction or the power-enable line failed.
    Bus(BusError),
    /// A sensor returned an error or an implausible reading.
    Sensor(SensorError),
    /// The key-value store failed.
    Storage(StorageError),
    /// A configuration record failed to decode or validate.
    Config(ConfigError),
    /// The BLE stack rejected a request.
    Ble(BleError),
    /// A named peripheral could not be resolved at startup.
    DeviceBinding(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Ble(e) => write!(f, "ble: {e}"),
            Self::DeviceBinding(name) => write!(f, "device '{name}' not bound"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The I2C transfer itself failed (NACK, arbitration loss, timeout).
    Transfer,
    /// The power-enable GPIO could not be driven.
    PowerLine,
    /// The bus permit could not be obtained within the bounded timeout.
    PermitTimeout,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer => write!(f, "I2C transfer failed"),
            Self::PowerLine => write!(f, "power-enable line failed"),
            Self::PermitTimeout => write!(f, "bus permit timed out"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The underlying bus transaction failed.
    Bus(BusError),
    /// The chip answered with an unexpected identification value.
    WrongChipId(u8),
    /// A channel was requested before any sample was fetched for it.
    NoData,
    /// The driver does not provide this channel.
    UnsupportedChannel,
    /// The ADC read returned an error.
    AdcReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "{e}"),
            Self::WrongChipId(id) => write!(f, "unexpected chip id 0x{id:02x}"),
            Self::NoData => write!(f, "no sample available"),
            Self::UnsupportedChannel => write!(f, "channel not supported"),
            Self::AdcReadFailed => write!(f, "ADC read failed"),
        }
    }
}

impl From<BusError> for SensorError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from the [`KvStore`](crate::app::ports::KvStore) port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Nothing was ever written for this key (first boot).
    NotFound,
    /// Storage partition is full.
    Full,
    /// The stored value does not fit the read buffer.
    TooLarge,
    /// Generic I/O error from the flash backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::TooLarge => write!(f, "stored value too large"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration record errors
// ---------------------------------------------------------------------------

/// Errors from [`ConfigStore`](crate::app::config_store::ConfigStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No record stored for this key yet.
    NotFound,
    /// Stored blob has the wrong length, version, or field encoding.
    Corrupted,
    /// A field failed range validation. The message names the field.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            StorageError::Full => Self::StorageFull,
            StorageError::TooLarge => Self::Corrupted,
            StorageError::IoError => Self::IoError,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// BLE errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleError {
    /// Controller or host stack failed to come up.
    StackInitFailed,
    /// Advertising could not be started.
    AdvertisingStart,
    /// Advertising could not be stopped.
    AdvertisingStop,
    /// A notification could not be queued.
    NotifyFailed,
    /// A client wrote a value of the wrong length.
    InvalidAttributeLength,
    /// The attribute does not exist or is not readable/writable that way.
    InvalidAttribute,
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackInitFailed => write!(f, "BLE stack initialisation failed"),
            Self::AdvertisingStart => write!(f, "advertising start failed"),
            Self::AdvertisingStop => write!(f, "advertising stop failed"),
            Self::NotifyFailed => write!(f, "notification failed"),
            Self::InvalidAttributeLength => write!(f, "invalid attribute length"),
            Self::InvalidAttribute => write!(f, "invalid attribute"),
        }
    }
}

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Self::Ble(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
