//! Mock hardware for integration tests.
//!
//! One [`MockBoard`] backs the I²C controller, the rail pin and the delay.
//! It records every rail edge, delay and transfer in order, so a test can
//! assert on the whole timeline a measurement produces.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation};

use envnode::app::ports::{Advertiser, BatteryAdc, KvStore, Notifier};
use envnode::drivers::power_bus::PowerGatedBus;
use envnode::error::{BleError, SensorError, StorageError};
use envnode::gatt::AttrId;

// ── Timeline ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HwEvent {
    RailHigh,
    RailLow,
    DelayMs(u32),
    Write(u8, Vec<u8>),
    Read(u8, usize),
    WriteRead(u8, u8, usize),
}

#[derive(Default)]
struct State {
    events: Vec<HwEvent>,
    rail_high: bool,
    /// Responses to `write_read(addr, [reg], ..)`.
    registers: HashMap<(u8, u8), Vec<u8>>,
    /// Responses to plain reads, keyed by address and length.
    reads: HashMap<(u8, usize), Vec<u8>>,
    /// Addresses that never acknowledge.
    absent: HashSet<u8>,
    /// Registers whose read-back fails.
    failing: HashSet<(u8, u8)>,
}

/// Handle to the shared mock board.  Clones share state.
#[derive(Clone, Default)]
pub struct MockBoard(Rc<RefCell<State>>);

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn i2c(&self) -> MockI2c {
        MockI2c(self.clone())
    }

    pub fn rail(&self) -> MockRail {
        MockRail(self.clone())
    }

    pub fn delay(&self) -> MockDelay {
        MockDelay(self.clone())
    }

    pub fn bus(&self) -> PowerGatedBus<MockI2c, MockRail, MockDelay> {
        PowerGatedBus::new(self.i2c(), self.rail(), self.delay())
    }

    pub fn events(&self) -> Vec<HwEvent> {
        self.0.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.0.borrow_mut().events.clear();
    }

    pub fn rail_is_high(&self) -> bool {
        self.0.borrow().rail_high
    }

    pub fn set_register(&self, addr: u8, reg: u8, bytes: &[u8]) {
        self.0
            .borrow_mut()
            .registers
            .insert((addr, reg), bytes.to_vec());
    }

    pub fn set_read(&self, addr: u8, bytes: &[u8]) {
        self.0
            .borrow_mut()
            .reads
            .insert((addr, bytes.len()), bytes.to_vec());
    }

    pub fn remove_device(&self, addr: u8) {
        self.0.borrow_mut().absent.insert(addr);
    }

    pub fn fail_register(&self, addr: u8, reg: u8) {
        self.0.borrow_mut().failing.insert((addr, reg));
    }

    fn push(&self, ev: HwEvent) {
        self.0.borrow_mut().events.push(ev);
    }

    fn register_read(&self, addr: u8, reg: u8, len: usize) -> Result<Option<Vec<u8>>, ErrorKind> {
        if self.0.borrow().failing.contains(&(addr, reg)) {
            return Err(ErrorKind::Other);
        }
        self.push(HwEvent::WriteRead(addr, reg, len));
        Ok(self.0.borrow().registers.get(&(addr, reg)).cloned())
    }

    fn plain_read(&self, addr: u8, len: usize) -> Option<Vec<u8>> {
        self.push(HwEvent::Read(addr, len));
        self.0.borrow().reads.get(&(addr, len)).cloned()
    }

    // ── Chip scripts ───────────────────────────────────────────

    /// Si7020 that answers its ID and reports the given codes.
    pub fn install_si7020(&self, rh_code: u16, temp_code: u16) {
        self.set_read(0x40, &[0x14, 0, 0, 0, 0, 0]);
        self.set_si7020_codes(rh_code, temp_code);
    }

    pub fn set_si7020_codes(&self, rh_code: u16, temp_code: u16) {
        self.set_read(0x40, &rh_code.to_be_bytes());
        self.set_register(0x40, 0xE0, &temp_code.to_be_bytes());
    }

    /// TSL4531 (package ID 0xA0) reporting `lux`.
    pub fn install_tsl4531(&self, lux: u16) {
        self.set_register(0x29, 0x8A, &[0xA4]);
        self.set_register(0x29, 0x84, &lux.to_le_bytes());
    }

    /// BMP280 with the datasheet calibration and raw conversion.
    pub fn install_bmp280(&self) {
        self.set_register(0x76, 0xD0, &[0x58]);
        let calib: [u16; 12] = [
            27504,
            26435,
            (-1000i16) as u16,
            36477,
            (-10685i16) as u16,
            3024,
            2855,
            140,
            (-7i16) as u16,
            15500,
            (-14600i16) as u16,
            6000,
        ];
        let bytes: Vec<u8> = calib.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.set_register(0x76, 0x88, &bytes);
        // adc_P = 415148, adc_T = 519888
        self.set_register(0x76, 0xF7, &[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00]);
    }
}

// ── I²C ───────────────────────────────────────────────────────

pub struct MockI2c(MockBoard);

impl i2c::ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let board = &self.0;
        if board.0.borrow().absent.contains(&address) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        let mut wrote: Option<Vec<u8>> = None;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => wrote = Some(bytes.to_vec()),
                Operation::Read(buf) => {
                    let response = match wrote.take() {
                        Some(w) if w.len() == 1 => board.register_read(address, w[0], buf.len())?,
                        _ => board.plain_read(address, buf.len()),
                    };
                    if let Some(r) = response {
                        let n = r.len().min(buf.len());
                        buf[..n].copy_from_slice(&r[..n]);
                    }
                }
            }
        }
        if let Some(w) = wrote {
            board.push(HwEvent::Write(address, w));
        }
        Ok(())
    }
}

// ── Rail pin ──────────────────────────────────────────────────

pub struct MockRail(MockBoard);

impl digital::ErrorType for MockRail {
    type Error = core::convert::Infallible;
}

impl OutputPin for MockRail {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.0.borrow_mut().rail_high = true;
        self.0.push(HwEvent::RailHigh);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.0.borrow_mut().rail_high = false;
        self.0.push(HwEvent::RailLow);
        Ok(())
    }
}

// ── Delay ─────────────────────────────────────────────────────

pub struct MockDelay(MockBoard);

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.push(HwEvent::DelayMs(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.push(HwEvent::DelayMs(ms));
    }
}

// ── Battery ADC ───────────────────────────────────────────────

pub struct MockAdc(pub u16);

impl BatteryAdc for MockAdc {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        Ok(self.0)
    }
}

// ── Key-value stores ──────────────────────────────────────────

/// Store whose every access fails with an I/O error.
#[derive(Default)]
pub struct BrokenStore {
    pub writes: usize,
}

impl KvStore for BrokenStore {
    fn read(&self, _key: u16, _buf: &mut [u8]) -> Result<usize, StorageError> {
        Err(StorageError::IoError)
    }

    fn write(&mut self, _key: u16, _data: &[u8]) -> Result<(), StorageError> {
        self.writes += 1;
        Err(StorageError::IoError)
    }

    fn delete(&mut self, _key: u16) -> Result<(), StorageError> {
        Err(StorageError::IoError)
    }

    fn exists(&self, _key: u16) -> bool {
        false
    }
}

// ── BLE ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNotifier {
    pub notified: Vec<(AttrId, Vec<u8>)>,
    pub cache: HashMap<AttrId, Vec<u8>>,
}

impl Notifier for MockNotifier {
    fn notify(&mut self, attr: AttrId, payload: &[u8]) -> Result<(), BleError> {
        self.notified.push((attr, payload.to_vec()));
        Ok(())
    }

    fn publish(&mut self, attr: AttrId, payload: &[u8]) {
        self.cache.insert(attr, payload.to_vec());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvCall {
    Start(Vec<u8>, u32),
    Stop,
}

#[derive(Default)]
pub struct MockAdvertiser {
    pub calls: Vec<AdvCall>,
}

#[allow(dead_code)]
impl MockAdvertiser {
    pub fn running(&self) -> Option<&[u8]> {
        match self.calls.last() {
            Some(AdvCall::Start(p, _)) => Some(p),
            _ => None,
        }
    }
}

impl Advertiser for MockAdvertiser {
    fn start(&mut self, payload: &[u8], interval: u32) -> Result<(), BleError> {
        self.calls.push(AdvCall::Start(payload.to_vec(), interval));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BleError> {
        self.calls.push(AdvCall::Stop);
        Ok(())
    }
}
