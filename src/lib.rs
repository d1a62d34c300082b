//! Hearth firmware framework library.
//!
//! Exposes the boot-mode controller and the captive-portal provisioning
//! subsystem for integration testing and external inspection. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module; everything else runs on the host.

#![deny(unused_must_use)]

pub mod boot;
pub mod config;
pub mod context;
pub mod portal;
pub mod ports;
pub mod registry;

pub mod adapters;
pub mod drivers;
