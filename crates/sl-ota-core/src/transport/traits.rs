//! GATT transport layer abstraction.
//!
//! Defines the `GattCentral`/`GattLink` traits for BLE communication,
//! allowing different implementations (btleplug, mock, etc.).

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    #[error("No matching device found within {timeout_secs}s")]
    DiscoveryTimeout { timeout_secs: u64 },

    #[error("Failed to connect to {device}: {message}")]
    ConnectFailed { device: String, message: String },

    #[error("Service discovery failed: {0}")]
    ServiceDiscovery(String),

    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound { uuid: Uuid },

    #[error("Write to {uuid} failed: {message}")]
    WriteFailed { uuid: Uuid, message: String },

    #[error("Read from {uuid} failed: {message}")]
    ReadFailed { uuid: Uuid, message: String },

    #[error("Device did not disconnect within {timeout_secs}s")]
    DisconnectTimeout { timeout_secs: u64 },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Bluetooth stack error: {0}")]
    Backend(String),
}

/// How a discovered peripheral matched the requested target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Address,
    Name,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Address => write!(f, "address"),
            MatchKind::Name => write!(f, "name"),
        }
    }
}

/// Selects the target peripheral during discovery.
///
/// A single `target` string is compared against both the BD address and
/// the advertised name, exactly as entered. Addresses compare
/// case-insensitively since platforms disagree on hex casing; names must
/// match byte for byte. The first advertisement that matches wins.
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    target: String,
}

impl DeviceFilter {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn matches(&self, address: &str, name: Option<&str>) -> Option<MatchKind> {
        if address.eq_ignore_ascii_case(&self.target) {
            return Some(MatchKind::Address);
        }
        if name == Some(self.target.as_str()) {
            return Some(MatchKind::Name);
        }
        None
    }
}

/// Abstract BLE central interface.
///
/// This trait enables:
/// - Production implementation using btleplug
/// - Mock implementation for unit testing
/// - Future alternative backends
#[async_trait]
pub trait GattCentral: Send + Sync {
    /// A discovered peripheral, connectable more than once.
    type Peer: Send + Sync + fmt::Display;
    /// An established connection.
    type Link: GattLink;

    /// Scan until an advertisement matches the filter. Stops at the first
    /// match; times out with `DiscoveryTimeout` otherwise.
    async fn discover(
        &self,
        filter: &DeviceFilter,
        timeout: Duration,
    ) -> Result<Self::Peer, TransportError>;

    /// Connect and run service discovery. Each call yields a fresh link.
    async fn connect(&self, peer: &Self::Peer) -> Result<Self::Link, TransportError>;
}

/// Operations on one established GATT connection.
#[async_trait]
pub trait GattLink: Send + Sync {
    /// UUIDs of the services the peripheral exposes.
    async fn services(&self) -> Result<Vec<Uuid>, TransportError>;

    /// Read a characteristic value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError>;

    /// Write a characteristic. `ack` selects write-request (acknowledged)
    /// vs write-command (fire and forget).
    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        ack: bool,
    ) -> Result<(), TransportError>;

    /// Negotiated ATT MTU, if the backend can report one.
    async fn negotiate_mtu(&self) -> Option<usize>;

    /// Block until the peripheral closes the connection, or time out.
    async fn await_disconnect(&self, timeout: Duration) -> Result<(), TransportError>;

    /// Drop the connection from our side.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_address_any_case() {
        let filter = DeviceFilter::new("D0:CF:5E:D9:12:3D");
        assert_eq!(
            filter.matches("d0:cf:5e:d9:12:3d", None),
            Some(MatchKind::Address)
        );
        assert_eq!(
            filter.matches("D0:CF:5E:D9:12:3D", Some("thermostat")),
            Some(MatchKind::Address)
        );
    }

    #[test]
    fn test_filter_matches_name_exactly() {
        let filter = DeviceFilter::new("thermostat");
        assert_eq!(
            filter.matches("AA:BB:CC:DD:EE:FF", Some("thermostat")),
            Some(MatchKind::Name)
        );
        assert_eq!(filter.matches("AA:BB:CC:DD:EE:FF", Some("Thermostat")), None);
    }

    #[test]
    fn test_filter_rejects_strangers() {
        let filter = DeviceFilter::new("thermostat");
        assert_eq!(filter.matches("AA:BB:CC:DD:EE:FF", None), None);
        assert_eq!(filter.matches("AA:BB:CC:DD:EE:FF", Some("kettle")), None);
    }
}
