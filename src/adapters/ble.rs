//! BLE stack adapter.
//!
//! Implements the [`Notifier`] and [`Advertiser`] ports over Bluedroid and
//! builds the GATT attribute table for DIS, BAS and ESS.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: in-memory simulation for host-side tests.
//!
//! ## Attribute table
//!
//! Registration walks [`table`] one entry per stack event: each
//! `*_EVT` completion records the handle of the entry just created and
//! issues the next one.  Every attribute uses stack auto-response, so
//! reads are served from the stack's cache, which the GATT model keeps
//! current through [`Notifier::publish`].
//!
//! | Attribute              | Perms       | Props        |
//! |------------------------|-------------|--------------|
//! | DIS revisions          | Read        | Read         |
//! | Battery Level          | Read        | Read+Notify  |
//! | ESS values             | Read        | Read+Notify  |
//! | CUD, Measurement, Range| Read        | -            |
//! | ES Trigger Setting     | Read        | -            |
//! | CCC                    | Read+Write  | -            |
//!
//! Client writes are latched by the callback and drained by the main loop
//! through [`take_write`]; the model validates them there.

use heapless::Vec;
use log::info;

use crate::app::events::Quantity;
use crate::app::ports::{Advertiser, Notifier};
use crate::error::BleError;
use crate::gatt::{
    ATTR_MAX_LEN, AttrId, BAS_UUID, BATTERY_LEVEL_UUID, CCC_UUID, DIS_UUID, ESS_UUID, EssAttr,
    HARDWARE_REVISION_UUID, SOFTWARE_REVISION_UUID,
};

/// Entries in [`table`]: 3 services, 4 DIS/BAS attributes, 6 per quantity.
const TABLE_LEN: usize = 3 + 4 + 4 * 6;

/// Client writes held until the main loop picks them up.
const WRITE_LATCH_DEPTH: usize = 8;

pub type LatchedWrite = (AttrId, Vec<u8, ATTR_MAX_LEN>);

// ───────────────────────────────────────────────────────────────
// Attribute table
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Service { uuid: u16, handles: u16 },
    Characteristic { uuid: u16, attr: AttrId, notify: bool },
    Descriptor { uuid: u16, attr: AttrId, writable: bool },
}

/// Creation order of every service, characteristic and descriptor.
pub fn table() -> Vec<Entry, TABLE_LEN> {
    let mut t = Vec::new();
    // Capacity matches TABLE_LEN exactly.
    let _ = t.push(Entry::Service {
        uuid: DIS_UUID,
        handles: 1 + 2 * 2,
    });
    let _ = t.push(Entry::Characteristic {
        uuid: SOFTWARE_REVISION_UUID,
        attr: AttrId::SoftwareRevision,
        notify: false,
    });
    let _ = t.push(Entry::Characteristic {
        uuid: HARDWARE_REVISION_UUID,
        attr: AttrId::HardwareRevision,
        notify: false,
    });
    let _ = t.push(Entry::Service {
        uuid: BAS_UUID,
        handles: 1 + 2 + 1,
    });
    let _ = t.push(Entry::Characteristic {
        uuid: BATTERY_LEVEL_UUID,
        attr: AttrId::BatteryLevel,
        notify: true,
    });
    let _ = t.push(Entry::Descriptor {
        uuid: CCC_UUID,
        attr: AttrId::BatteryCcc,
        writable: true,
    });
    let _ = t.push(Entry::Service {
        uuid: ESS_UUID,
        handles: 1 + 4 * (2 + 5),
    });
    for q in Quantity::ALL {
        for a in EssAttr::ALL {
            let attr = AttrId::Ess(q, a);
            let entry = match a {
                EssAttr::Value => Entry::Characteristic {
                    uuid: q.uuid(),
                    attr,
                    notify: true,
                },
                EssAttr::Ccc => Entry::Descriptor {
                    uuid: a.uuid(q),
                    attr,
                    writable: true,
                },
                _ => Entry::Descriptor {
                    uuid: a.uuid(q),
                    attr,
                    writable: false,
                },
            };
            let _ = t.push(entry);
        }
    }
    t
}

// ───────────────────────────────────────────────────────────────
// Write latch (callback → main loop)
// ───────────────────────────────────────────────────────────────

// GATTS callbacks run in the Bluedroid task, not an ISR, so std Mutex is safe.
static WRITE_LATCH: std::sync::Mutex<heapless::Deque<LatchedWrite, WRITE_LATCH_DEPTH>> =
    std::sync::Mutex::new(heapless::Deque::new());

fn latch_write(attr: AttrId, data: &[u8]) {
    let mut value = Vec::new();
    if value.extend_from_slice(data).is_err() {
        log::warn!("BLE: {:?} write of {} bytes dropped", attr, data.len());
        return;
    }
    if let Ok(mut latch) = WRITE_LATCH.lock() {
        if latch.is_full() {
            latch.pop_front();
        }
        let _ = latch.push_back((attr, value));
    }
}

/// Consume the oldest client write, if any.
pub fn take_write() -> Option<LatchedWrite> {
    WRITE_LATCH.lock().ok().and_then(|mut latch| latch.pop_front())
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF static state
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These statics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
mod stack {
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use esp_idf_svc::sys::*;
    use heapless::Vec;

    use super::{Entry, TABLE_LEN, latch_write, table};
    use crate::gatt::{ATTR_MAX_LEN, AttrId};

    pub static GATTS_IF: AtomicU32 = AtomicU32::new(0);
    pub static CONN_ID: AtomicU32 = AtomicU32::new(0);
    pub static CONNECTED: AtomicBool = AtomicBool::new(false);
    pub static READY: AtomicBool = AtomicBool::new(false);
    pub static ADV_WANTED: AtomicBool = AtomicBool::new(false);
    pub static ADV_INTERVAL: AtomicU32 = AtomicU32::new(0);

    static STEP: AtomicU32 = AtomicU32::new(0);
    static SVC_HANDLE: AtomicU32 = AtomicU32::new(0);

    static HANDLES: std::sync::Mutex<Vec<(u16, AttrId), TABLE_LEN>> =
        std::sync::Mutex::new(Vec::new());

    /// Backing store handed to the stack at creation; it copies the bytes.
    static EMPTY_VALUE: [u8; ATTR_MAX_LEN] = [0; ATTR_MAX_LEN];

    pub fn handle_of(attr: AttrId) -> Option<u16> {
        HANDLES
            .lock()
            .ok()?
            .iter()
            .find(|(_, a)| *a == attr)
            .map(|(h, _)| *h)
    }

    fn attr_of(handle: u16) -> Option<AttrId> {
        HANDLES
            .lock()
            .ok()?
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, a)| *a)
    }

    fn uuid16(uuid: u16) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = ESP_UUID_LEN_16 as u16;
        t.uuid.uuid16 = uuid;
        t
    }

    /// Issue the creation request for the current table entry.
    unsafe fn advance(gatts_if: esp_gatt_if_t) {
        let step = STEP.load(Ordering::Relaxed) as usize;
        let t = table();
        let Some(entry) = t.get(step) else {
            READY.store(true, Ordering::Release);
            log::info!("BLE GATTS: attribute table registered ({} entries)", t.len());
            return;
        };
        let svc = SVC_HANDLE.load(Ordering::Relaxed) as u16;
        let mut value = esp_attr_value_t {
            attr_max_len: ATTR_MAX_LEN as u16,
            attr_len: 0,
            attr_value: EMPTY_VALUE.as_ptr() as *mut u8,
        };
        let mut control = esp_attr_control_t {
            auto_rsp: ESP_GATT_AUTO_RSP as u8,
        };
        match *entry {
            Entry::Service { uuid, handles } => {
                let mut id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: uuid16(uuid),
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                unsafe { esp_ble_gatts_create_service(gatts_if, &mut id, handles) };
            }
            Entry::Characteristic { uuid, notify, .. } => {
                let mut prop = ESP_GATT_CHAR_PROP_BIT_READ;
                if notify {
                    prop |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
                }
                let mut u = uuid16(uuid);
                unsafe {
                    esp_ble_gatts_add_char(
                        svc,
                        &mut u,
                        ESP_GATT_PERM_READ as esp_gatt_perm_t,
                        prop as esp_gatt_char_prop_t,
                        &mut value,
                        &mut control,
                    );
                }
            }
            Entry::Descriptor { uuid, writable, .. } => {
                let mut perm = ESP_GATT_PERM_READ;
                if writable {
                    perm |= ESP_GATT_PERM_WRITE;
                }
                let mut u = uuid16(uuid);
                unsafe {
                    esp_ble_gatts_add_char_descr(
                        svc,
                        &mut u,
                        perm as esp_gatt_perm_t,
                        &mut value,
                        &mut control,
                    );
                }
            }
        }
    }

    /// Record the handle created for the current entry and move on.
    unsafe fn record(gatts_if: esp_gatt_if_t, handle: u16) {
        let step = STEP.load(Ordering::Relaxed) as usize;
        let attr = match table().get(step) {
            Some(Entry::Characteristic { attr, .. } | Entry::Descriptor { attr, .. }) => *attr,
            _ => return,
        };
        if let Ok(mut handles) = HANDLES.lock() {
            let _ = handles.push((handle, attr));
        }
        log::debug!("BLE GATTS: {:?} → handle {}", attr, handle);
        STEP.store(step as u32 + 1, Ordering::Relaxed);
        unsafe { advance(gatts_if) };
    }

    pub fn adv_params(interval: u32) -> esp_ble_adv_params_t {
        let interval = interval.clamp(0x20, 0x4000) as u16;
        esp_ble_adv_params_t {
            adv_int_min: interval,
            adv_int_max: interval,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..unsafe { core::mem::zeroed() }
        }
    }

    pub unsafe fn start_advertising() {
        let mut params = adv_params(ADV_INTERVAL.load(Ordering::Relaxed));
        unsafe { esp_ble_gap_start_advertising(&mut params) };
    }

    pub unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_RAW_SET_COMPLETE_EVT => {
                if ADV_WANTED.load(Ordering::Relaxed) {
                    unsafe { start_advertising() };
                }
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising started");
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising stopped");
            }
            _ => {}
        }
    }

    pub unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        GATTS_IF.store(gatts_if as u32, Ordering::Relaxed);

        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                log::info!("BLE GATTS: app registered (if={})", gatts_if);
                STEP.store(0, Ordering::Relaxed);
                unsafe { advance(gatts_if) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let svc_handle = unsafe { (*param).create.service_handle };
                SVC_HANDLE.store(svc_handle as u32, Ordering::Relaxed);
                log::info!("BLE GATTS: service created (handle={})", svc_handle);
                unsafe { esp_ble_gatts_start_service(svc_handle) };
                STEP.fetch_add(1, Ordering::Relaxed);
                unsafe { advance(gatts_if) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let handle = unsafe { (*param).add_char.attr_handle };
                unsafe { record(gatts_if, handle) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                let handle = unsafe { (*param).add_char_descr.attr_handle };
                unsafe { record(gatts_if, handle) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let p = unsafe { &(*param).connect };
                CONN_ID.store(p.conn_id as u32, Ordering::Relaxed);
                CONNECTED.store(true, Ordering::Release);
                log::info!("BLE GATTS: client connected (conn_id={})", p.conn_id);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                CONNECTED.store(false, Ordering::Release);
                log::info!("BLE GATTS: client disconnected");
                if ADV_WANTED.load(Ordering::Relaxed) {
                    unsafe { start_advertising() };
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = unsafe { &(*param).write };
                if p.is_prep {
                    return;
                }
                let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
                match attr_of(p.handle) {
                    Some(attr) => latch_write(attr, data),
                    None => log::warn!("BLE GATTS: write to unknown handle {}", p.handle),
                }
            }
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Registering,
    Ready,
    Failed,
}

/// Owns the BLE stack lifecycle and hands out the port handles.
pub struct BleAdapter {
    state: BleState,
    device_name: &'static str,
}

impl BleAdapter {
    pub fn new(device_name: &'static str) -> Self {
        Self {
            state: BleState::Idle,
            device_name,
        }
    }

    pub fn state(&self) -> BleState {
        #[cfg(target_os = "espidf")]
        if self.state == BleState::Registering
            && stack::READY.load(core::sync::atomic::Ordering::Acquire)
        {
            return BleState::Ready;
        }
        self.state
    }

    /// Bring up controller and host, then start attribute registration.
    /// Registration completes asynchronously; poll [`state`](Self::state).
    pub fn start(&mut self) -> Result<(), BleError> {
        info!("BLE: starting stack as '{}'", self.device_name);
        match self.platform_start() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = BleState::Failed;
                Err(e)
            }
        }
    }

    pub fn notifier(&self) -> BleNotifier {
        BleNotifier::new()
    }

    pub fn advertiser(&self) -> BleAdvertiser {
        BleAdvertiser::new()
    }

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), BleError> {
        use esp_idf_svc::sys::*;

        let check = |ret: esp_err_t, what: &str| {
            if ret == ESP_OK {
                Ok(())
            } else {
                log::error!("BLE: {} failed ({})", what, ret);
                Err(BleError::StackInitFailed)
            }
        };

        unsafe {
            // BLE-only: release classic BT memory.
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
            check(
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                "bt_controller_enable",
            )?;
            check(esp_bluedroid_init(), "bluedroid_init")?;
            check(esp_bluedroid_enable(), "bluedroid_enable")?;

            check(
                esp_ble_gap_register_callback(Some(stack::gap_event_handler)),
                "gap_register_callback",
            )?;
            check(
                esp_ble_gatts_register_callback(Some(stack::gatts_event_handler)),
                "gatts_register_callback",
            )?;

            let mut name = [0u8; 32];
            let n = self.device_name.len().min(name.len() - 1);
            name[..n].copy_from_slice(&self.device_name.as_bytes()[..n]);
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);

            check(esp_ble_gatts_app_register(0), "gatts_app_register")?;
        }
        self.state = BleState::Registering;
        info!("BLE(espidf): Bluedroid up, registering attribute table");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), BleError> {
        self.state = BleState::Ready;
        info!("BLE(sim): {} attributes registered", table().len());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Notifier
// ───────────────────────────────────────────────────────────────

pub struct BleNotifier {
    /// Simulation: the attribute cache a client would read from.
    #[cfg(not(target_os = "espidf"))]
    cache: std::collections::HashMap<AttrId, std::vec::Vec<u8>>,
    #[cfg(not(target_os = "espidf"))]
    sent: usize,
}

impl BleNotifier {
    fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            cache: std::collections::HashMap::new(),
            #[cfg(not(target_os = "espidf"))]
            sent: 0,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn cached(&self, attr: AttrId) -> Option<&[u8]> {
        self.cache.get(&attr).map(std::vec::Vec::as_slice)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Notifier for BleNotifier {
    #[cfg(target_os = "espidf")]
    fn notify(&mut self, attr: AttrId, payload: &[u8]) -> Result<(), BleError> {
        use core::sync::atomic::Ordering;
        use esp_idf_svc::sys::*;

        if !stack::CONNECTED.load(Ordering::Acquire) {
            return Ok(());
        }
        let handle = stack::handle_of(attr).ok_or(BleError::InvalidAttribute)?;
        let mut buf = [0u8; ATTR_MAX_LEN];
        let n = payload.len().min(ATTR_MAX_LEN);
        buf[..n].copy_from_slice(&payload[..n]);
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                stack::GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t,
                stack::CONN_ID.load(Ordering::Relaxed) as u16,
                handle,
                n as u16,
                buf.as_mut_ptr(),
                false,
            )
        };
        if ret == ESP_OK {
            Ok(())
        } else {
            Err(BleError::NotifyFailed)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn notify(&mut self, attr: AttrId, payload: &[u8]) -> Result<(), BleError> {
        log::debug!("BLE(sim): notify {:?} {:02x?}", attr, payload);
        self.sent += 1;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn publish(&mut self, attr: AttrId, payload: &[u8]) {
        let Some(handle) = stack::handle_of(attr) else {
            return;
        };
        let ret = unsafe {
            esp_idf_svc::sys::esp_ble_gatts_set_attr_value(
                handle,
                payload.len() as u16,
                payload.as_ptr(),
            )
        };
        if ret != esp_idf_svc::sys::ESP_OK {
            log::warn!("BLE: {:?} cache update failed ({})", attr, ret);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn publish(&mut self, attr: AttrId, payload: &[u8]) {
        self.cache.insert(attr, payload.to_vec());
    }
}

// ───────────────────────────────────────────────────────────────
// Advertiser
// ───────────────────────────────────────────────────────────────

pub struct BleAdvertiser {
    #[cfg(not(target_os = "espidf"))]
    active: Option<(std::vec::Vec<u8>, u32)>,
}

impl BleAdvertiser {
    fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            active: None,
        }
    }

    /// Simulation: payload and interval currently on air.
    #[cfg(not(target_os = "espidf"))]
    pub fn active(&self) -> Option<(&[u8], u32)> {
        self.active.as_ref().map(|(p, i)| (p.as_slice(), *i))
    }
}

impl Advertiser for BleAdvertiser {
    #[cfg(target_os = "espidf")]
    fn start(&mut self, payload: &[u8], interval: u32) -> Result<(), BleError> {
        use core::sync::atomic::Ordering;

        stack::ADV_INTERVAL.store(interval, Ordering::Relaxed);
        stack::ADV_WANTED.store(true, Ordering::Relaxed);
        let mut buf = [0u8; crate::gatt::advertising::ADV_MAX_LEN];
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        // Advertising starts from the raw-data-set completion event.
        let ret =
            unsafe { esp_idf_svc::sys::esp_ble_gap_config_adv_data_raw(buf.as_mut_ptr(), n as u32) };
        if ret == esp_idf_svc::sys::ESP_OK {
            Ok(())
        } else {
            Err(BleError::AdvertisingStart)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn start(&mut self, payload: &[u8], interval: u32) -> Result<(), BleError> {
        info!("BLE(sim): advertising {} bytes every {}", payload.len(), interval);
        self.active = Some((payload.to_vec(), interval));
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn stop(&mut self) -> Result<(), BleError> {
        stack::ADV_WANTED.store(false, core::sync::atomic::Ordering::Relaxed);
        let ret = unsafe { esp_idf_svc::sys::esp_ble_gap_stop_advertising() };
        if ret == esp_idf_svc::sys::ESP_OK {
            Ok(())
        } else {
            Err(BleError::AdvertisingStop)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn stop(&mut self) -> Result<(), BleError> {
        self.active = None;
        Ok(())
    }
}

/// Simulation: deliver a client write as the stack callback would.
#[cfg(not(target_os = "espidf"))]
pub fn sim_client_write(attr: AttrId, data: &[u8]) {
    latch_write(attr, data);
}
