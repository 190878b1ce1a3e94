//! Decoders for the OTA version characteristics.
//!
//! The bootloader build of the service exposes small read-only
//! characteristics describing the AppLoader, the OTA protocol and the
//! underlying Gecko bootloader. All fields are little-endian.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VersionError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// AppLoader version characteristic (8 bytes: 4 x u16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppLoaderVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u16,
}

impl AppLoaderVersion {
    pub const SIZE: usize = 8;

    pub fn from_bytes(data: &[u8]) -> Result<Self, VersionError> {
        if data.len() < Self::SIZE {
            return Err(VersionError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            major: cursor.read_u16::<LittleEndian>()?,
            minor: cursor.read_u16::<LittleEndian>()?,
            patch: cursor.read_u16::<LittleEndian>()?,
            build: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

impl fmt::Display for AppLoaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}-{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

/// Gecko bootloader version characteristic (4 bytes: u8 major, u8 minor,
/// u16 customer-specific part).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderVersion {
    pub major: u8,
    pub minor: u8,
    pub customer: u16,
}

impl BootloaderVersion {
    pub const SIZE: usize = 4;

    pub fn from_bytes(data: &[u8]) -> Result<Self, VersionError> {
        if data.len() < Self::SIZE {
            return Err(VersionError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            major: cursor.read_u8()?,
            minor: cursor.read_u8()?,
            customer: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// OTA protocol version characteristic (1 byte).
pub fn parse_ota_version(data: &[u8]) -> Result<u8, VersionError> {
    match data.first() {
        Some(&v) => Ok(v),
        None => Err(VersionError::BufferTooSmall {
            expected: 1,
            actual: 0,
        }),
    }
}

/// Application version characteristic (4 bytes, u32), published only by
/// firmware that opts in.
pub fn parse_application_version(data: &[u8]) -> Result<u32, VersionError> {
    if data.len() < 4 {
        return Err(VersionError::BufferTooSmall {
            expected: 4,
            actual: data.len(),
        });
    }
    let mut cursor = Cursor::new(data);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// Everything the bootloader told us about itself. Each field is read
/// independently and stays `None` if its characteristic is absent or the
/// read failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub apploader: Option<AppLoaderVersion>,
    pub ota_protocol: Option<u8>,
    pub bootloader: Option<BootloaderVersion>,
    pub application: Option<u32>,
}

impl VersionInfo {
    pub fn is_empty(&self) -> bool {
        self.apploader.is_none()
            && self.ota_protocol.is_none()
            && self.bootloader.is_none()
            && self.application.is_none()
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "unprobed");
        }
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            Ok(())
        };
        if let Some(al) = &self.apploader {
            sep(f)?;
            write!(f, "AppLoader {al}")?;
        }
        if let Some(ota) = self.ota_protocol {
            sep(f)?;
            write!(f, "OTA: {ota}")?;
        }
        if let Some(bl) = &self.bootloader {
            sep(f)?;
            write!(f, "Gecko {bl}, customer: {:#06x}", bl.customer)?;
        }
        if let Some(app) = self.application {
            sep(f)?;
            write!(f, "app: {app}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apploader_version_decode() {
        let raw = [1u8, 0, 2, 0, 3, 0, 4, 0];
        let v = AppLoaderVersion::from_bytes(&raw).unwrap();
        assert_eq!(
            v,
            AppLoaderVersion {
                major: 1,
                minor: 2,
                patch: 3,
                build: 4
            }
        );
        assert_eq!(v.to_string(), "1.2.3-4");
    }

    #[test]
    fn test_apploader_version_short_buffer() {
        let err = AppLoaderVersion::from_bytes(&[1, 0, 2]).unwrap_err();
        assert!(matches!(
            err,
            VersionError::BufferTooSmall {
                expected: 8,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_bootloader_version_decode() {
        let raw = [1u8, 10, 0xA2, 0x01];
        let v = BootloaderVersion::from_bytes(&raw).unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 10);
        assert_eq!(v.customer, 0x01A2);
    }

    #[test]
    fn test_ota_version_single_byte() {
        assert_eq!(parse_ota_version(&[3, 99]).unwrap(), 3);
        assert!(parse_ota_version(&[]).is_err());
    }

    #[test]
    fn test_summary_line_matches_device_report() {
        let info = VersionInfo {
            apploader: Some(AppLoaderVersion {
                major: 1,
                minor: 2,
                patch: 3,
                build: 4,
            }),
            ota_protocol: Some(3),
            bootloader: Some(BootloaderVersion {
                major: 1,
                minor: 10,
                customer: 0x01A2,
            }),
            application: None,
        };
        assert_eq!(
            info.to_string(),
            "AppLoader 1.2.3-4, OTA: 3, Gecko 1.10, customer: 0x01a2"
        );
    }

    #[test]
    fn test_empty_info_renders_unprobed() {
        assert_eq!(VersionInfo::default().to_string(), "unprobed");
    }
}
