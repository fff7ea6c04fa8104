//! Power-gated I²C transport.
//!
//! The three sensors share one I²C bus and one switched supply rail.  Every
//! transfer powers the rail itself:
//!
//! ```text
//!  power_en ─┐ high ┌─ settle ─┬─ transfer ─┬─ low if permit full ─┐
//!            └──────┘  1 ms    └────────────┘                      └─▶
//! ```
//!
//! A driver that needs the rail to stay up between transfers (start a
//! conversion, wait, read the result) takes the [`Permit`] first.  While the
//! permit is held no transfer drives the rail low; the first transfer after
//! the release does.  A span that fails before that closing transfer powers
//! the rail down itself through [`SharedBus::power_down_if_idle`].
//!
//! The bus is used from the single work-queue context, so the I²C driver,
//! the power pin and the delay sit behind `RefCell`s and the bus is shared
//! by plain reference between drivers.

use core::cell::RefCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::{Error as _, I2c};
use log::{debug, error, warn};

use crate::app::ports::SharedBus;
use crate::config::{BUS_MAX_PERMITS, BUS_SETTLE_MS};
use crate::error::BusError;

// ═══════════════════════════════════════════════════════════════
//  Counting permit
// ═══════════════════════════════════════════════════════════════

/// Counting permit bounding holders of the sensor rail.
pub struct Permit {
    available: AtomicUsize,
    max: usize,
}

impl Permit {
    pub const fn new(max: usize) -> Self {
        Self {
            available: AtomicUsize::new(max),
            max,
        }
    }

    /// Take one permit if any is free.
    pub fn try_acquire(&self) -> bool {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Give one permit back.  Returns `false` if none was outstanding.
    pub fn release(&self) -> bool {
        let max = self.max;
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    /// No caller holds a permit.
    pub fn is_full(&self) -> bool {
        self.available() == self.max
    }
}

/// Scoped permit span: acquired on construction, released on drop.
///
/// A span dropped without [`finish`](Self::finish) ended in an error; the
/// drop then also powers the rail down, because the caller returns early and
/// no closing transfer follows.
pub struct PermitGuard<'a, B: SharedBus + ?Sized> {
    bus: &'a B,
    finished: bool,
}

impl<'a, B: SharedBus + ?Sized> PermitGuard<'a, B> {
    pub fn acquire(bus: &'a B, timeout_ms: u32) -> Result<Self, BusError> {
        bus.acquire_permit(timeout_ms)?;
        Ok(Self {
            bus,
            finished: false,
        })
    }

    /// Release the permit and leave the rail up for the closing transfer.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl<B: SharedBus + ?Sized> Drop for PermitGuard<'_, B> {
    fn drop(&mut self) {
        self.bus.release_permit();
        if !self.finished && self.bus.power_down_if_idle().is_err() {
            error!("PermitGuard: could not drive rail low after failed span");
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Bus
// ═══════════════════════════════════════════════════════════════

pub struct PowerGatedBus<I2C, PIN, D> {
    i2c: RefCell<I2C>,
    power: RefCell<PIN>,
    delay: RefCell<D>,
    permit: Permit,
}

impl<I2C, PIN, D> PowerGatedBus<I2C, PIN, D>
where
    I2C: I2c,
    PIN: OutputPin,
    D: DelayNs,
{
    /// Take ownership of the bus, rail pin and delay.  The rail is driven
    /// low immediately.
    pub fn new(i2c: I2C, mut power: PIN, delay: D) -> Self {
        if power.set_low().is_err() {
            error!("PowerGatedBus: could not drive rail low at init");
        }
        Self {
            i2c: RefCell::new(i2c),
            power: RefCell::new(power),
            delay: RefCell::new(delay),
            permit: Permit::new(BUS_MAX_PERMITS),
        }
    }

    pub fn permit(&self) -> &Permit {
        &self.permit
    }

    fn power_up(&self) -> Result<(), BusError> {
        self.power
            .borrow_mut()
            .set_high()
            .map_err(|_| BusError::PowerLine)?;
        self.delay.borrow_mut().delay_ms(BUS_SETTLE_MS);
        Ok(())
    }

    /// Run one transfer inside a power-up / power-down bracket.  The rail is
    /// considered for power-down even when the transfer fails.
    fn transaction(
        &self,
        address: u8,
        op: impl FnOnce(&mut I2C) -> Result<(), I2C::Error>,
    ) -> Result<(), BusError> {
        if let Err(e) = self.power_up() {
            let _ = self.power_down_if_idle();
            return Err(e);
        }

        let transfer = op(&mut *self.i2c.borrow_mut()).map_err(|e| {
            warn!("PowerGatedBus: transfer to 0x{:02x} failed ({:?})", address, e.kind());
            BusError::Transfer
        });

        let rail = self.power_down_if_idle();
        if rail.is_err() {
            error!("PowerGatedBus: could not drive rail low");
        }
        transfer.and(rail)
    }
}

impl<I2C, PIN, D> SharedBus for PowerGatedBus<I2C, PIN, D>
where
    I2C: I2c,
    PIN: OutputPin,
    D: DelayNs,
{
    fn write(&self, bytes: &[u8], address: u8) -> Result<(), BusError> {
        self.transaction(address, |i2c| i2c.write(address, bytes))
    }

    fn read(&self, into: &mut [u8], address: u8) -> Result<(), BusError> {
        self.transaction(address, |i2c| i2c.read(address, into))
    }

    fn burst_read(&self, address: u8, register: u8, into: &mut [u8]) -> Result<(), BusError> {
        self.transaction(address, |i2c| i2c.write_read(address, &[register], into))
    }

    fn acquire_permit(&self, timeout_ms: u32) -> Result<(), BusError> {
        let mut waited_ms = 0;
        loop {
            if self.permit.try_acquire() {
                debug!("PowerGatedBus: permit taken after {} ms", waited_ms);
                return Ok(());
            }
            if waited_ms >= timeout_ms {
                warn!("PowerGatedBus: permit not available within {} ms", timeout_ms);
                return Err(BusError::PermitTimeout);
            }
            self.delay.borrow_mut().delay_ms(1);
            waited_ms += 1;
        }
    }

    fn release_permit(&self) {
        if !self.permit.release() {
            warn!("PowerGatedBus: permit released without being held");
        }
    }

    fn power_down_if_idle(&self) -> Result<(), BusError> {
        if !self.permit.is_full() {
            return Ok(());
        }
        self.power
            .borrow_mut()
            .set_low()
            .map_err(|_| BusError::PowerLine)
    }
}
