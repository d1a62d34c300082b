//! Application context.
//!
//! One explicit object, constructed once at startup, carrying everything
//! the boot modes and the portal share: device identity, branding,
//! firmware info, process flags, the configuration store and the
//! introspection registries. Components receive it by reference (or as a
//! [`SharedContext`] clone where a handler thread is involved) — there is
//! no global accessor.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::adapters::device_id;
use crate::config::ConfigStore;
use crate::registry::{NodeRegistry, SettingsRegistry};

/// Provisioning-protocol version reported by `/device-info`.
pub const PROTOCOL_VERSION: &str = "1.1.0";

/// Framework version reported by `/device-info`.
pub const FRAMEWORK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Firmware identity, set by the firmware author.
#[derive(Debug, Clone)]
pub struct FirmwareInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// Process-wide flags. `reboot` is the only way out of a boot mode;
/// `disable_normal` is raised by a successful configuration write so the
/// device protocol never starts against half-applied state.
#[derive(Debug, Default, Clone, Copy)]
pub struct Flags {
    pub reboot: bool,
    pub disable_normal: bool,
}

pub struct AppContext {
    pub brand: &'static str,
    pub firmware: FirmwareInfo,
    pub device_id: &'static str,
    pub flags: Flags,
    pub config: ConfigStore,
    pub settings: SettingsRegistry,
    pub nodes: NodeRegistry,
    /// Optional WPA2 password protecting the configuration AP.
    pub ap_password: Option<&'static str>,
}

impl AppContext {
    pub fn new(
        brand: &'static str,
        firmware: FirmwareInfo,
        config: ConfigStore,
        settings: SettingsRegistry,
        nodes: NodeRegistry,
    ) -> Self {
        Self {
            brand,
            firmware,
            device_id: device_id::get(),
            flags: Flags::default(),
            config,
            settings,
            nodes,
            ap_password: None,
        }
    }

    /// The provisioning AP's SSID: `<brand>-<deviceId>`.
    pub fn ap_name(&self) -> String {
        format!("{}-{}", self.brand, self.device_id)
    }
}

/// Context handle shared between the tick loop and the network stack's
/// handler callbacks. Handlers never run concurrently with each other,
/// but they do interleave with ticks, so access goes through the mutex.
pub type SharedContext = Arc<Mutex<AppContext>>;

/// Lock a shared context, recovering from a poisoned mutex — a panicking
/// handler must not take the whole device down with it.
pub fn lock(ctx: &SharedContext) -> MutexGuard<'_, AppContext> {
    match ctx.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
