//! Device identity.
//!
//! The payload carries the configured `device_id` verbatim.  When that is
//! left empty, a stable ID is derived from the factory MAC address in the
//! form `ENV-XXYYZZ` (last 3 bytes of the 6-byte MAC, uppercase hex), so
//! a fleet can be flashed with one image.

use core::fmt::Write;

/// Fixed-size device ID, same capacity as `SystemConfig::device_id`.
pub type DeviceIdString = heapless::String<32>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

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
    [0x24, 0x6F, 0x28, 0x1A, 0x2B, 0x3C]
}

/// Derive the short device ID from the last 3 MAC bytes.
pub fn device_id_from_mac(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "ENV-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// The configured ID if set, otherwise the MAC-derived one.
pub fn resolve_device_id(configured: &str, mac: &MacAddress) -> DeviceIdString {
    let trimmed = configured.trim();
    if trimmed.is_empty() {
        return device_id_from_mac(mac);
    }
    let mut id = DeviceIdString::new();
    for c in trimmed.chars() {
        if id.push(c).is_err() {
            break;
        }
    }
    id
}
