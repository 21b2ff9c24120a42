//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for EnvSense.
//!
//! - Config validation: [`SystemConfig::validate`] runs before every save.
//! - Namespace isolation: each subsystem uses its own namespace
//!   (`envsense` for config, `restart` for the restart log).
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Host builds keep everything in an in-memory map.

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;

#[cfg(not(target_os = "espidf"))]
use std::{cell::RefCell, collections::HashMap};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "envsense";
const CONFIG_KEY: &str = "syscfg";

/// Upper bound on the postcard-encoded [`SystemConfig`].
const MAX_CONFIG_BLOB: usize = 512;

/// NVS keys and namespaces are limited to 15 characters plus NUL.
#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

/// Simulated flash: one map per (namespace, key).
#[cfg(not(target_os = "espidf"))]
type SimFlash = RefCell<HashMap<(String, String), Vec<u8>>>;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    flash: SimFlash,
}

impl NvsAdapter {
    /// Bring up the default NVS partition.
    ///
    /// A partition that is full or was written by a newer IDF is erased
    /// and initialised from scratch.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: runs on the main task before either loop is spawned.
            let mut ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NvsAdapter: partition unusable ({}), erasing", ret);
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                ret = unsafe { nvs_flash_init() };
            }
            if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: flash ready");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: in-memory flash");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            flash: RefCell::new(HashMap::new()),
        })
    }

    // ── Blob layer ────────────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn get_blob(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let flash = self.flash.borrow();
        let data = flash
            .get(&(namespace.to_owned(), key.to_owned()))
            .ok_or(StorageError::NotFound)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    #[cfg(not(target_os = "espidf"))]
    fn put_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.flash
            .borrow_mut()
            .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn erase_blob(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.flash
            .borrow_mut()
            .remove(&(namespace.to_owned(), key.to_owned()));
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn has_blob(&self, namespace: &str, key: &str) -> bool {
        self.flash
            .borrow()
            .contains_key(&(namespace.to_owned(), key.to_owned()))
    }

    #[cfg(target_os = "espidf")]
    fn get_blob(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let key = c_name(key);
        with_handle(namespace, nvs_open_mode_t_NVS_READONLY, |h| {
            let mut len = buf.len();
            let ret = unsafe {
                nvs_get_blob(h, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut len)
            };
            (ret == ESP_OK).then_some(len).ok_or(ret)
        })
        .map_err(|e| match e {
            ESP_ERR_NVS_NOT_FOUND => StorageError::NotFound,
            _ => StorageError::IoError,
        })
    }

    #[cfg(target_os = "espidf")]
    fn put_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = c_name(key);
        with_handle(namespace, nvs_open_mode_t_NVS_READWRITE, |h| {
            let ret =
                unsafe { nvs_set_blob(h, key.as_ptr().cast(), data.as_ptr().cast(), data.len()) };
            commit_after(h, ret)
        })
        .map_err(|e| match e {
            ESP_ERR_NVS_NOT_ENOUGH_SPACE => StorageError::Full,
            other => {
                warn!("NvsAdapter: write {}/{} failed ({})", namespace, c_str(&key), other);
                StorageError::IoError
            }
        })
    }

    #[cfg(target_os = "espidf")]
    fn erase_blob(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let key = c_name(key);
        with_handle(namespace, nvs_open_mode_t_NVS_READWRITE, |h| {
            match unsafe { nvs_erase_key(h, key.as_ptr().cast()) } {
                ESP_ERR_NVS_NOT_FOUND => Ok(()),
                ret => commit_after(h, ret),
            }
        })
        .map_err(|_| StorageError::IoError)
    }

    #[cfg(target_os = "espidf")]
    fn has_blob(&self, namespace: &str, key: &str) -> bool {
        let key = c_name(key);
        with_handle(namespace, nvs_open_mode_t_NVS_READONLY, |h| {
            Ok(unsafe { nvs_find_key(h, key.as_ptr().cast(), core::ptr::null_mut()) } == ESP_OK)
        })
        .unwrap_or(false)
    }

    // ── Config ────────────────────────────────────────────────

    /// Encode and store `config` as-is.  Callers validate first.
    fn write_config(&self, config: &SystemConfig) -> Result<usize, ConfigError> {
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        if bytes.len() > MAX_CONFIG_BLOB {
            return Err(ConfigError::StorageFull);
        }
        self.put_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|e| match e {
                StorageError::Full => ConfigError::StorageFull,
                _ => ConfigError::IoError,
            })?;
        Ok(bytes.len())
    }
}

/// Run `f` against an open handle on `namespace`; the handle is always closed.
#[cfg(target_os = "espidf")]
fn with_handle<T>(
    namespace: &str,
    mode: nvs_open_mode_t,
    f: impl FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
) -> Result<T, esp_err_t> {
    let ns = c_name(namespace);
    let mut handle: nvs_handle_t = 0;
    let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
    if ret != ESP_OK {
        return Err(ret);
    }
    let result = f(handle);
    unsafe { nvs_close(handle) };
    result
}

/// Follow a successful mutation with `nvs_commit`.
#[cfg(target_os = "espidf")]
fn commit_after(handle: nvs_handle_t, ret: esp_err_t) -> Result<(), esp_err_t> {
    if ret != ESP_OK {
        return Err(ret);
    }
    match unsafe { nvs_commit(handle) } {
        ESP_OK => Ok(()),
        err => Err(err),
    }
}

#[cfg(target_os = "espidf")]
fn c_str(name: &[u8; 16]) -> &str {
    let end = name.iter().position(|b| *b == 0).unwrap_or(name.len());
    core::str::from_utf8(&name[..end]).unwrap_or("?")
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = vec![0u8; MAX_CONFIG_BLOB];
        let len = match self.get_blob(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: nothing stored, using defaults");
                return Ok(SystemConfig::default());
            }
            Err(e) => {
                warn!("NvsAdapter: config unreadable ({}), using defaults", e);
                return Ok(SystemConfig::default());
            }
        };
        let cfg: SystemConfig =
            postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        info!("NvsAdapter: config loaded ({} bytes)", len);
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let len = self.write_config(config)?;
        info!("NvsAdapter: config stored ({} bytes)", len);
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.get_blob(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put_blob(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.erase_blob(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.has_blob(namespace, key)
    }
}
