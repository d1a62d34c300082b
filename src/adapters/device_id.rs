//! Device identity derived from the factory MAC address.
//!
//! Produces a stable, human-readable device ID (the full 6-byte MAC in
//! lowercase hex, e.g. `a4cf12de9b01`). The ID is:
//! - Deterministic across reboots (factory-burned eFuse MAC)
//! - Used in the provisioning AP name (`<brand>-<deviceId>`)
//! - Reported as `device_hardware_id` in `/device-info`
//!
//! The string is computed lazily on first use and cached for the process
//! lifetime.

use std::sync::OnceLock;

/// Fixed-size device ID string: 12 hex chars for a 6-byte MAC.
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

static DEVICE_ID: OnceLock<DeviceIdString> = OnceLock::new();

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Format a MAC as the device ID string.
pub fn format_mac(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    for byte in mac {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// The memoized device ID. The first call reads the MAC; every later call
/// returns the cached string.
pub fn get() -> &'static str {
    DEVICE_ID.get_or_init(|| format_mac(&read_mac())).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_lowercase_hex() {
        let mac = [0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC];
        assert_eq!(format_mac(&mac).as_str(), "001122aabbcc");
    }

    #[test]
    fn sim_mac_deterministic() {
        assert_eq!(read_mac(), read_mac());
    }

    #[test]
    fn get_is_stable_across_calls() {
        let a = get();
        let b = get();
        assert_eq!(a, b);
        assert_eq!(a, "deadbeefcafe");
    }
}
