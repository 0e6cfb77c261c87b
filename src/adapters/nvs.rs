//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`PersistencePort`] over the ESP-IDF NVS C API, with an
//! in-memory simulation backend for host tests.
//!
//! Storage layout, all in the `conf` namespace:
//!
//! | key        | contents                                   |
//! |------------|--------------------------------------------|
//! | `wifi`     | postcard blob of [`WifiCredentials`]       |
//! | `settings` | postcard blob of MQTT config + threshold   |
//! | `counters` | postcard blob of [`Counters`]              |
//! | `init`     | first-boot marker (written once, ever)     |
//!
//! Records are postcard blobs rather than per-field entries so a
//! partially-written multi-field update can never be observed: ESP-IDF
//! commits each blob atomically.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::PersistencePort;
use crate::config::{Counters, MqttConfig, StoredConfig, WifiCredentials};
use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "conf";
const KEY_WIFI: &str = "wifi";
const KEY_SETTINGS: &str = "settings";
const KEY_COUNTERS: &str = "counters";
const KEY_INIT: &str = "init";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 1024;

/// The web-changeable settings, persisted as one atomic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsRecord {
    mqtt: MqttConfig,
    distance_threshold_cm: u32,
}

pub struct NvsGateway {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsGateway {
    /// Create the gateway and initialise NVS flash.
    ///
    /// On first boot or after an IDF version mismatch the partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
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
            info!("NvsGateway: ESP-IDF NVS initialised");
            Ok(Self {})
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsGateway: simulation backend");
            Ok(Self::new_sim())
        }
    }

    /// Empty simulation store (host tests).
    #[cfg(not(target_os = "espidf"))]
    pub fn new_sim() -> Self {
        Self {
            store: RefCell::new(HashMap::new()),
        }
    }

    // ── Blob primitives ───────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.store.borrow().get(key).cloned())
    }

    #[cfg(not(target_os = "espidf"))]
    fn put_blob(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store.borrow_mut().insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn del_blob(&mut self, key: &str) -> Result<(), StorageError> {
        self.store.borrow_mut().remove(key);
        Ok(())
    }

    /// Open the `conf` namespace, run a closure with the handle, close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = NAMESPACE.as_bytes();
        ns_buf[..ns_bytes.len()].copy_from_slice(ns_bytes);

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
    fn key_cstr(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let kb = key.as_bytes();
        let kl = kb.len().min(15);
        buf[..kl].copy_from_slice(&kb[..kl]);
        buf
    }

    #[cfg(target_os = "espidf")]
    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let result = Self::with_nvs_handle(false, |handle| {
            let key_buf = Self::key_cstr(key);
            let mut size: usize = 0;

            // First call: size only.
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret == ESP_ERR_NVS_NOT_FOUND {
                return Err(ESP_ERR_NVS_NOT_FOUND);
            }
            if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                return Err(ret);
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        });
        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
            Err(e) => {
                warn!("NvsGateway: read error {e} for '{key}'");
                Err(StorageError::IoError)
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn put_blob(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let result = Self::with_nvs_handle(true, |handle| {
            let key_buf = Self::key_cstr(key);
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
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
        result.map_err(|e| {
            warn!("NvsGateway: write error {e} for '{key}'");
            StorageError::IoError
        })
    }

    #[cfg(target_os = "espidf")]
    fn del_blob(&mut self, key: &str) -> Result<(), StorageError> {
        let result = Self::with_nvs_handle(true, |handle| {
            let key_buf = Self::key_cstr(key);
            let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| {
            warn!("NvsGateway: erase error {e} for '{key}'");
            StorageError::IoError
        })
    }

    // ── Typed record helpers ──────────────────────────────────

    fn load_record<T: for<'de> Deserialize<'de>>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.get_blob(key)? {
            Some(bytes) => {
                let value = postcard::from_bytes(&bytes).map_err(|_| StorageError::Corrupted)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn save_record<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(value).map_err(|_| StorageError::IoError)?;
        self.put_blob(key, &bytes)
    }
}

impl PersistencePort for NvsGateway {
    fn load_config(&self) -> Result<StoredConfig, StorageError> {
        let mut stored = StoredConfig::default();

        match self.load_record::<WifiCredentials>(KEY_WIFI) {
            Ok(Some(wifi)) => stored.wifi = wifi,
            Ok(None) => info!("NvsGateway: no stored credentials"),
            Err(_) => warn!("NvsGateway: credentials corrupt, using defaults"),
        }
        match self.load_record::<SettingsRecord>(KEY_SETTINGS) {
            Ok(Some(settings)) => {
                stored.mqtt = settings.mqtt;
                stored
                    .dispenser
                    .set_distance_threshold_cm(settings.distance_threshold_cm);
            }
            Ok(None) => info!("NvsGateway: no stored settings, using defaults"),
            Err(_) => warn!("NvsGateway: settings corrupt, using defaults"),
        }
        match self.load_record::<Counters>(KEY_COUNTERS) {
            Ok(Some(counters)) => stored.counters = counters,
            Ok(None) => {}
            Err(_) => warn!("NvsGateway: counters corrupt, starting from zero"),
        }

        Ok(stored)
    }

    fn save_wifi(&mut self, creds: &WifiCredentials) -> Result<(), StorageError> {
        self.save_record(KEY_WIFI, creds)?;
        info!("NvsGateway: credentials saved for '{}'", creds.ssid);
        Ok(())
    }

    fn save_config(
        &mut self,
        mqtt: &MqttConfig,
        distance_threshold_cm: u32,
    ) -> Result<(), StorageError> {
        let record = SettingsRecord {
            mqtt: mqtt.clone(),
            distance_threshold_cm,
        };
        self.save_record(KEY_SETTINGS, &record)?;
        info!("NvsGateway: settings saved (threshold {distance_threshold_cm} cm)");
        Ok(())
    }

    fn save_counters(&mut self, counters: &Counters) -> Result<(), StorageError> {
        self.save_record(KEY_COUNTERS, counters)
    }

    fn clear_wifi(&mut self) -> Result<(), StorageError> {
        self.del_blob(KEY_WIFI)?;
        info!("NvsGateway: credentials cleared");
        Ok(())
    }

    fn clear_config(&mut self) -> Result<(), StorageError> {
        self.del_blob(KEY_SETTINGS)?;
        info!("NvsGateway: settings cleared");
        Ok(())
    }

    fn first_boot(&self) -> Result<bool, StorageError> {
        Ok(self.get_blob(KEY_INIT)?.is_none())
    }

    fn set_initial_config(&mut self, defaults: &StoredConfig) -> Result<(), StorageError> {
        self.save_wifi(&defaults.wifi)?;
        self.save_config(&defaults.mqtt, defaults.dispenser.distance_threshold_cm)?;
        self.save_counters(&defaults.counters)?;
        self.put_blob(KEY_INIT, &[1])?;
        info!("NvsGateway: initial configuration written");
        Ok(())
    }
}
