//! Session-level error taxonomy.
//!
//! Transport, image and version decoding keep their own error types;
//! everything the update flow can die of is folded into [`OtaError`] so
//! callers see one coherent failure vocabulary. Conversions are explicit
//! at the call sites because the same transport error means different
//! things in different phases (a failed connect after the reboot request
//! is a bootloader-entry failure, not a generic connect failure).

use thiserror::Error;

use crate::payload::ImageError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum OtaError {
    #[error("No device matching {device} found within {timeout_secs}s")]
    DiscoveryTimeout { device: String, timeout_secs: u64 },

    #[error("Device does not expose the OTA service")]
    MissingService,

    #[error("Failed to enter bootloader: {reason}")]
    BootloaderEntry { reason: String },

    #[error("Device did not disconnect within {timeout_secs}s of the reboot request")]
    DisconnectTimeout { timeout_secs: u64 },

    #[error("Characteristic IO failed: {0}")]
    CharacteristicIo(#[source] TransportError),

    #[error("Invalid firmware image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
}
