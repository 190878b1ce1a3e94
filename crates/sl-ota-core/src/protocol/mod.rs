//! Protocol module - Silicon Labs OTA service definitions.

pub mod constants;
pub mod version;

pub use constants::*;
pub use version::{
    AppLoaderVersion, BootloaderVersion, VersionError, VersionInfo, parse_application_version,
    parse_ota_version,
};
