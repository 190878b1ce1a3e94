//! Protocol constants for the Silicon Labs OTA GATT service.
//!
//! UUIDs and opcodes match the AppLoader bootloader as shipped in the
//! Gecko SDK; both the application build and the bootloader expose the
//! same service, differing only in which characteristics are present.

use uuid::Uuid;

// ============================================================================
// OTA Service
// ============================================================================

/// Silicon Labs OTA service
pub const OTA_SERVICE_UUID: Uuid = Uuid::from_u128(0x1d14d6ee_fd63_4fa1_bfa4_8f47b42119f0);

/// OTA Control characteristic (commands, acknowledged writes)
pub const OTA_CONTROL_UUID: Uuid = Uuid::from_u128(0xf7bf3564_fb6d_4e53_88a4_5e37e0326063);

/// OTA Data characteristic (firmware payload stream)
pub const OTA_DATA_UUID: Uuid = Uuid::from_u128(0x984227f3_34fc_4045_a5d0_2c581f81a153);

// Version characteristics, bootloader build only
/// AppLoader version (4 x u16 little-endian: major, minor, patch, build)
pub const APPLOADER_VERSION_UUID: Uuid = Uuid::from_u128(0x4f4a2368_8cca_451e_bfff_cf0e2ee23e9f);
/// OTA protocol version (single byte)
pub const OTA_VERSION_UUID: Uuid = Uuid::from_u128(0x4cc07bcf_0868_4b32_9dad_ba4cc41e5316);
/// Gecko bootloader version (u8 major, u8 minor, u16 customer)
pub const GECKO_BOOTLOADER_VERSION_UUID: Uuid =
    Uuid::from_u128(0x25f05c0a_e917_46e9_b2a5_aa2be1245afe);
/// Application version, present when the firmware publishes one
pub const APPLICATION_VERSION_UUID: Uuid =
    Uuid::from_u128(0x0d77cc11_4ac1_49f2_bfa9_cd96ac7a92f8);

// ============================================================================
// Control Opcodes (Host -> OTA Control)
// ============================================================================

/// Begin an update. In the application build this reboots the device into
/// AppLoader; in the bootloader build it arms the data stream.
pub const CMD_START: u8 = 0x00;

/// End of image; the bootloader verifies and applies the staged firmware.
pub const CMD_FINISH: u8 = 0x03;

/// Ask the target to close the connection.
pub const CMD_DISCONNECT: u8 = 0x04;

// ============================================================================
// ATT Sizing
// ============================================================================

/// ATT write request header (opcode + handle) subtracted from the MTU.
pub const ATT_WRITE_OVERHEAD: usize = 3;

/// Baseline ATT MTU every BLE link supports.
pub const DEFAULT_ATT_MTU: usize = 23;

/// Smallest data payload worth sending; chunk size never drops below this.
pub const MIN_WRITE_PAYLOAD: usize = 20;

// ============================================================================
// Timing
// ============================================================================

/// Pause after each unacknowledged data write, milliseconds.
pub const UNACKED_WRITE_GAP_MS: u64 = 2;

/// Settle time after START in application-based mode; the target erases
/// its staging slot before it can accept data.
pub const APPLICATION_SETTLE_MS: u64 = 1_000;

/// Human-readable name for a known OTA characteristic.
pub fn characteristic_name(uuid: Uuid) -> Option<&'static str> {
    match uuid {
        OTA_CONTROL_UUID => Some("OTA Control"),
        OTA_DATA_UUID => Some("OTA Data"),
        APPLOADER_VERSION_UUID => Some("AppLoader version"),
        OTA_VERSION_UUID => Some("OTA version"),
        GECKO_BOOTLOADER_VERSION_UUID => Some("Gecko Bootloader version"),
        APPLICATION_VERSION_UUID => Some("Application version"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuid_canonical() {
        assert_eq!(
            OTA_SERVICE_UUID.to_string(),
            "1d14d6ee-fd63-4fa1-bfa4-8f47b42119f0"
        );
    }

    #[test]
    fn test_characteristic_names() {
        assert_eq!(characteristic_name(OTA_CONTROL_UUID), Some("OTA Control"));
        assert_eq!(characteristic_name(OTA_SERVICE_UUID), None);
    }
}
