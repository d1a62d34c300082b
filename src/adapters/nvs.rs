//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] — the persistence backing for the
//! configuration document, the next-boot intent record and the UI bundle.
//!
//! - **`target_os = "espidf"`**: raw `nvs_*` calls against the default
//!   partition. Commits are atomic per `nvs_commit()`.
//! - **all other targets**: an in-memory map for host-side tests.
//!
//! Namespaces isolate the subsystems: `hearth` for the config document and
//! boot intent, `assets` for the UI bundle.

use log::info;

use crate::ports::{StorageError, StoragePort};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const MAX_BLOB_SIZE: usize = 16 * 1024;

pub struct NvsStorage {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
}

impl NvsStorage {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after an NVS version mismatch the partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                log::warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsStorage: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStorage: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
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
    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let kb = key.as_bytes();
        let kl = kb.len().min(15);
        buf[..kl].copy_from_slice(&kb[..kl]);
        buf
    }
}

impl StoragePort for NvsStorage {
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.get(&composite).cloned().ok_or(StorageError::NotFound)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key_buf = Self::key_buf(key);
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
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
                Ok(bytes) => Ok(bytes),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::IoError);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key_buf = Self::key_buf(key);
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
                log::warn!("NvsStorage: write error {} for {}::{}", e, namespace, key);
                StorageError::IoError
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key_buf = Self::key_buf(key);
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
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key_buf = Self::key_buf(key);
                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}
