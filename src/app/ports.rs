//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ NodeService / GattServer (domain)
//! ```
//!
//! Driven adapters (flash store, sensor bus, battery ADC, BLE stack) implement
//! these traits.  The domain consumes them via generics, so the measurement
//! pipeline never touches hardware directly and runs unchanged on the host.

use crate::error::{BleError, BusError, SensorError, StorageError};
use crate::gatt::AttrId;

use super::events::Measurement;

// ───────────────────────────────────────────────────────────────
// Key-value store (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage keyed by a small integer.
///
/// - A read after a completed write, before another write, returns the
///   written bytes exactly.
/// - A read of a key that was never written returns
///   [`StorageError::NotFound`].
/// - A stored value longer than `buf` is not truncated; the read fails
///   with [`StorageError::TooLarge`].
/// - Writes are atomic: no partially written record is ever visible.  The
///   ESP-IDF NVS engine guarantees this per commit.
pub trait KvStore {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, key: u16, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, key: u16) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, key: u16) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Shared sensor bus (driven adapter: drivers → I²C + power rail)
// ───────────────────────────────────────────────────────────────

/// Power-gated I²C transport shared by every sensor driver.
///
/// Each transfer powers the rail up, waits the settle time, runs, then
/// powers the rail down unless a caller holds the permit.  A driver that
/// needs the rail to stay up across several transfers wraps them in
/// [`acquire_permit`](Self::acquire_permit) / [`release_permit`](Self::release_permit).
pub trait SharedBus {
    fn write(&self, bytes: &[u8], address: u8) -> Result<(), BusError>;

    fn read(&self, into: &mut [u8], address: u8) -> Result<(), BusError>;

    /// Write `register`, then read `into.len()` bytes in one transaction.
    fn burst_read(&self, address: u8, register: u8, into: &mut [u8]) -> Result<(), BusError>;

    /// Wait up to `timeout_ms` for the permit.
    fn acquire_permit(&self, timeout_ms: u32) -> Result<(), BusError>;

    fn release_permit(&self);

    /// Drive the rail low if no permit is held.  A span that ends in an
    /// error calls this after releasing, since no later transfer will.
    fn power_down_if_idle(&self) -> Result<(), BusError>;
}

impl<T: SharedBus + ?Sized> SharedBus for &T {
    fn write(&self, bytes: &[u8], address: u8) -> Result<(), BusError> {
        (**self).write(bytes, address)
    }

    fn read(&self, into: &mut [u8], address: u8) -> Result<(), BusError> {
        (**self).read(into, address)
    }

    fn burst_read(&self, address: u8, register: u8, into: &mut [u8]) -> Result<(), BusError> {
        (**self).burst_read(address, register, into)
    }

    fn acquire_permit(&self, timeout_ms: u32) -> Result<(), BusError> {
        (**self).acquire_permit(timeout_ms)
    }

    fn release_permit(&self) {
        (**self).release_permit();
    }

    fn power_down_if_idle(&self) -> Result<(), BusError> {
        (**self).power_down_if_idle()
    }
}

// ───────────────────────────────────────────────────────────────
// Battery ADC (driven adapter: hardware → fuel gauge)
// ───────────────────────────────────────────────────────────────

/// Raw battery-voltage reading, scaled to a 10-bit conversion.
pub trait BatteryAdc {
    fn read_raw(&mut self) -> Result<u16, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Monotonic clock
// ───────────────────────────────────────────────────────────────

pub trait Clock {
    /// Milliseconds since boot.  Never goes backwards.
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Measurement sink (domain → presentation)
// ───────────────────────────────────────────────────────────────

/// Receives every completed measurement.  The GATT server implements this;
/// decorators such as the log tap wrap it.
pub trait MeasurementSink {
    fn on_measurement(&mut self, measurement: &Measurement);
}

// ───────────────────────────────────────────────────────────────
// BLE stack (driven adapter: GATT model → link layer)
// ───────────────────────────────────────────────────────────────

/// Outbound side of the GATT server.
pub trait Notifier {
    /// Send a notification for `attr` to every subscribed connection.
    fn notify(&mut self, attr: AttrId, payload: &[u8]) -> Result<(), BleError>;

    /// Republish the readable value of `attr` to the stack's attribute
    /// cache.  Stacks that call back into the model for reads ignore this.
    fn publish(&mut self, _attr: AttrId, _payload: &[u8]) {}
}

/// Advertising control.  Advertising data is immutable while advertising
/// runs, so changing it means stop, rewrite, start.
pub trait Advertiser {
    fn start(&mut self, payload: &[u8], interval: u32) -> Result<(), BleError>;

    fn stop(&mut self) -> Result<(), BleError>;
}
