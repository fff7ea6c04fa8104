//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`KvStore`] over one NVS namespace.  Record keys are small
//! integers; each maps to the NVS key string `k<id>`.
//!
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Missing keys surface as [`StorageError::NotFound`] so the config
//!   store can seed defaults on first boot.
//! - On the host the backend is an in-memory map.

use crate::app::ports::KvStore;
use crate::error::StorageError;
use log::info;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "envnode";

/// NVS key and namespace names are at most 15 characters plus NUL.
const NVS_NAME_LEN: usize = 16;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<u16, Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// NUL-terminated NVS key for a record id.
    fn key_name(key: u16) -> [u8; NVS_NAME_LEN] {
        let mut buf = [0u8; NVS_NAME_LEN];
        buf[0] = b'k';
        let mut digits = [0u8; 5];
        let mut n = key;
        let mut len = 0;
        loop {
            digits[len] = b'0' + (n % 10) as u8;
            len += 1;
            n /= 10;
            if n == 0 {
                break;
            }
        }
        for (i, d) in digits[..len].iter().rev().enumerate() {
            buf[1 + i] = *d;
        }
        buf
    }

    /// Open the namespace, run `f` with the handle, then close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; NVS_NAME_LEN];
        let ns_bytes = NAMESPACE.as_bytes();
        let len = ns_bytes.len().min(NVS_NAME_LEN - 1);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn map_err(ret: i32) -> StorageError {
        match ret {
            ESP_ERR_NVS_NOT_FOUND => StorageError::NotFound,
            ESP_ERR_NVS_NOT_ENOUGH_SPACE => StorageError::Full,
            ESP_ERR_NVS_INVALID_LENGTH => StorageError::TooLarge,
            _ => StorageError::IoError,
        }
    }
}

impl KvStore for NvsAdapter {
    fn read(&self, key: u16, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.borrow().get(&key) {
                Some(data) if data.len() > buf.len() => Err(StorageError::TooLarge),
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let name = Self::key_name(key);
            // A namespace that was never written cannot be opened read-only.
            Self::with_nvs_handle(false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        name.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            })
            .map_err(Self::map_err)
        }
    }

    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().insert(key, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let name = Self::key_name(key);
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        name.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: k{} saved ({} bytes)", key, data.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(Self::map_err(e))
                }
            }
        }
    }

    fn delete(&mut self, key: u16) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().remove(&key);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let name = Self::key_name(key);
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, name.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(Self::map_err)
        }
    }

    fn exists(&self, key: u16) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow().contains_key(&key)
        }

        #[cfg(target_os = "espidf")]
        {
            let name = Self::key_name(key);
            let result = Self::with_nvs_handle(false, |handle| {
                let ret = unsafe {
                    nvs_find_key(handle, name.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(key: u16) -> String {
        let buf = NvsAdapter::key_name(key);
        let end = buf.iter().position(|&b| b == 0).unwrap();
        String::from_utf8(buf[..end].to_vec()).unwrap()
    }

    #[test]
    fn key_names() {
        assert_eq!(name(0), "k0");
        assert_eq!(name(4), "k4");
        assert_eq!(name(65_535), "k65535");
    }

    #[test]
    fn read_after_write_returns_same_bytes() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(2, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(nvs.read(2, &mut buf), Ok(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn missing_key_is_not_found() {
        let nvs = NvsAdapter::new().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(nvs.read(9, &mut buf), Err(StorageError::NotFound));
        assert!(!nvs.exists(9));
    }

    #[test]
    fn oversized_value_is_not_truncated() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(3, &[0u8; 16]).unwrap();
        let mut buf = [0u8; 12];
        assert_eq!(nvs.read(3, &mut buf), Err(StorageError::TooLarge));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(1, &[7]).unwrap();
        assert!(nvs.exists(1));
        nvs.delete(1).unwrap();
        nvs.delete(1).unwrap();
        assert!(!nvs.exists(1));
    }
}
