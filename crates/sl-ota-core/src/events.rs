//! Event system for UI decoupling.
//!
//! Allows CLI/GUI frontends to subscribe to update progress without
//! tight coupling to the core logic.

use crate::protocol::VersionInfo;
use crate::state::OtaState;

/// Events emitted by an OTA session.
#[derive(Debug, Clone)]
pub enum OtaEvent {
    /// Session moved to a new state.
    StateChanged { from: OtaState, to: OtaState },
    /// Discovery matched the target.
    DeviceFound { device: String },
    /// START written to the application; reboot requested.
    RebootRequested,
    /// The application dropped the connection as requested.
    DeviceRebooted,
    /// Version characteristics read from the bootloader.
    Versions { info: VersionInfo },
    /// Upload geometry settled; streaming begins.
    UploadStarted {
        total_bytes: usize,
        chunk_count: usize,
        chunk_size: usize,
    },
    /// One data chunk handed to the link. `index` counts from 1.
    ChunkSent {
        index: usize,
        total: usize,
        bytes: usize,
    },
    /// All chunks and FINISH written.
    UploadFinished {
        bytes: usize,
        elapsed_secs: f64,
        bytes_per_sec: f64,
        bits_per_sec: f64,
    },
    /// Session ended successfully.
    Complete,
    /// Session ended in failure.
    Failed { message: String },
}

/// Observer trait for receiving OTA events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait OtaObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &OtaEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl OtaObserver for NullObserver {
    fn on_event(&self, _event: &OtaEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl OtaObserver for TracingObserver {
    fn on_event(&self, event: &OtaEvent) {
        match event {
            OtaEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "State transition");
            }
            OtaEvent::DeviceFound { device } => {
                tracing::info!(device = %device, "Device found");
            }
            OtaEvent::RebootRequested => {
                tracing::info!("Requested reboot into OTA mode");
            }
            OtaEvent::DeviceRebooted => {
                tracing::info!("Device rebooted");
            }
            OtaEvent::Versions { info } => {
                tracing::info!(versions = %info, "OTA version information");
            }
            OtaEvent::UploadStarted {
                total_bytes,
                chunk_count,
                chunk_size,
            } => {
                tracing::info!(
                    bytes = total_bytes,
                    chunks = chunk_count,
                    chunk_size = chunk_size,
                    "Uploading"
                );
            }
            OtaEvent::ChunkSent { index, total, .. } => {
                tracing::debug!(chunk = index, total = total, "Chunk sent");
            }
            OtaEvent::UploadFinished {
                bytes,
                elapsed_secs,
                bytes_per_sec,
                bits_per_sec,
            } => {
                tracing::info!(
                    bytes = bytes,
                    secs = %format!("{elapsed_secs:.2}"),
                    rate = %format!("{bytes_per_sec:.2} Bps / {bits_per_sec:.2} bps"),
                    "Upload complete"
                );
            }
            OtaEvent::Complete => {
                tracing::info!("Update complete");
            }
            OtaEvent::Failed { message } => {
                tracing::error!("{message}");
            }
        }
    }
}
