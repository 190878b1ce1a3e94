//! sl-ota-core: Silicon Labs BLE OTA client in Rust.
//!
//! This crate implements the GATT-based OTA update flow used by Silicon
//! Labs EFR32 devices, driving the AppLoader bootloader (or an
//! application-hosted updater) over the standard OTA service.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Service/characteristic UUIDs, control opcodes, version decoding
//! - **Payload**: GBL image loading, chunking, transfer accounting
//! - **Transport**: BLE central abstraction (btleplug, mock)
//! - **State**: Update state machine
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use sl_ota_core::session::{OtaSession, SessionConfig};
//! use sl_ota_core::transport::BtleplugCentral;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = SessionConfig {
//!     device: "AA:BB:CC:DD:EE:FF".to_string(),
//!     firmware_path: Some("application.gbl".to_string()),
//!     ..Default::default()
//! };
//!
//! let central = BtleplugCentral::open().await?;
//! let mut session = OtaSession::new(central, config);
//! let report = session.run().await?;
//! println!("{} bytes in {:.2}s", report.bytes_sent, report.elapsed_secs);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use error::OtaError;
pub use events::{NullObserver, OtaEvent, OtaObserver, TracingObserver};
pub use payload::{FirmwareImage, ImageError, TransferPlan, TransferProgress};
pub use protocol::version::{AppLoaderVersion, BootloaderVersion, VersionInfo};
pub use session::{OtaSession, SessionConfig, UpdateReport};
pub use state::{OtaState, UpdateMode};
pub use transport::{
    BtleplugCentral, DeviceFilter, GattCentral, GattLink, MockCentral, TransportError,
};
