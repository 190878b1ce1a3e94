//! btleplug-based BLE transport implementation.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::traits::{DeviceFilter, GattCentral, GattLink, TransportError};

const SCAN_POLL: Duration = Duration::from_millis(200);
const DISCONNECT_POLL: Duration = Duration::from_millis(100);

/// A link dropped out from under an operation maps to `Disconnected`;
/// any other backend failure keeps the operation's own error context.
fn link_error(
    e: btleplug::Error,
    fallback: impl FnOnce(String) -> TransportError,
) -> TransportError {
    match e {
        btleplug::Error::NotConnected => TransportError::Disconnected,
        e => fallback(e.to_string()),
    }
}

/// A peripheral seen during a scan, with the advertisement fields the
/// filter matched against.
#[derive(Debug, Clone)]
pub struct BtlePeer {
    peripheral: Peripheral,
    pub address: String,
    pub name: Option<String>,
}

impl fmt::Display for BtlePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({name})", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// One row of `scan` output.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// btleplug-based BLE central.
pub struct BtleplugCentral {
    adapter: Adapter,
}

impl BtleplugCentral {
    /// Grab the first Bluetooth adapter on the system.
    #[instrument(level = "info")]
    pub async fn open() -> Result<Self, TransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Backend(e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Backend(e.to_string()))?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;
        Ok(Self { adapter })
    }

    /// Passive listing for the `scan` command: collect everything heard
    /// for `duration` and report it.
    pub async fn scan(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::Backend(e.to_string()))?;
        tokio::time::sleep(duration).await;

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        let mut devices = Vec::new();
        for peripheral in peripherals {
            let Some(props) = peripheral.properties().await.ok().flatten() else {
                continue;
            };
            devices.push(DiscoveredDevice {
                address: peripheral.address().to_string(),
                name: props.local_name,
                rssi: props.rssi,
            });
        }

        let _ = self.adapter.stop_scan().await;
        Ok(devices)
    }

    async fn scan_for(
        &self,
        filter: &DeviceFilter,
        timeout: Duration,
    ) -> Result<BtlePeer, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut ignored = HashSet::new();

        loop {
            let peripherals = self
                .adapter
                .peripherals()
                .await
                .map_err(|e| TransportError::Backend(e.to_string()))?;

            for peripheral in peripherals {
                // Advertisements fill in over several reports; a peripheral
                // first seen nameless may match by name on a later pass.
                let Some(props) = peripheral.properties().await.ok().flatten() else {
                    continue;
                };
                let address = peripheral.address().to_string();
                let name = props.local_name;

                if let Some(kind) = filter.matches(&address, name.as_deref()) {
                    info!(
                        address = %address,
                        name = name.as_deref().unwrap_or(""),
                        matched_by = %kind,
                        "Matched device"
                    );
                    return Ok(BtlePeer {
                        peripheral,
                        address,
                        name,
                    });
                }

                if ignored.insert(peripheral.id()) {
                    debug!(address = %address, name = name.as_deref().unwrap_or(""), "Ignoring");
                }
            }

            if Instant::now() >= deadline {
                return Err(TransportError::DiscoveryTimeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(SCAN_POLL).await;
        }
    }
}

#[async_trait]
impl GattCentral for BtleplugCentral {
    type Peer = BtlePeer;
    type Link = BtleplugLink;

    #[instrument(level = "info", skip(self, filter), fields(target = %filter.target()))]
    async fn discover(
        &self,
        filter: &DeviceFilter,
        timeout: Duration,
    ) -> Result<BtlePeer, TransportError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        let outcome = self.scan_for(filter, timeout).await;
        let _ = self.adapter.stop_scan().await;
        outcome
    }

    #[instrument(level = "info", skip(self, peer), fields(device = %peer))]
    async fn connect(&self, peer: &BtlePeer) -> Result<BtleplugLink, TransportError> {
        peer.peripheral
            .connect()
            .await
            .map_err(|e| TransportError::ConnectFailed {
                device: peer.to_string(),
                message: e.to_string(),
            })?;

        if let Err(e) = peer.peripheral.discover_services().await {
            let _ = peer.peripheral.disconnect().await;
            return Err(TransportError::ServiceDiscovery(e.to_string()));
        }

        let link = BtleplugLink {
            peripheral: peer.peripheral.clone(),
        };
        info!(services = link.peripheral.services().len(), "Connected");
        Ok(link)
    }
}

/// One GATT connection to a peripheral.
pub struct BtleplugLink {
    peripheral: Peripheral,
}

impl BtleplugLink {
    fn find_characteristic(
        &self,
        characteristic: Uuid,
    ) -> Result<btleplug::api::Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(TransportError::CharacteristicNotFound {
                uuid: characteristic,
            })
    }
}

#[async_trait]
impl GattLink for BtleplugLink {
    async fn services(&self) -> Result<Vec<Uuid>, TransportError> {
        Ok(self.peripheral.services().iter().map(|s| s.uuid).collect())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        let c = self.find_characteristic(characteristic)?;
        let data = self.peripheral.read(&c).await.map_err(|e| {
            link_error(e, |message| TransportError::ReadFailed {
                uuid: characteristic,
                message,
            })
        })?;
        debug!(characteristic = %characteristic, len = data.len(), "Read complete");
        Ok(data)
    }

    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        ack: bool,
    ) -> Result<(), TransportError> {
        let c = self.find_characteristic(characteristic)?;
        let write_type = if ack {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral
            .write(&c, payload, write_type)
            .await
            .map_err(|e| {
                link_error(e, |message| TransportError::WriteFailed {
                    uuid: characteristic,
                    message,
                })
            })
    }

    async fn negotiate_mtu(&self) -> Option<usize> {
        // btleplug does not surface the negotiated ATT MTU; the session
        // falls back to its configured value.
        None
    }

    async fn await_disconnect(&self, timeout: Duration) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.peripheral.is_connected().await.unwrap_or(false) {
                debug!("Peripheral dropped the connection");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TransportError::DisconnectTimeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(DISCONNECT_POLL).await;
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::OTA_CONTROL_UUID;

    #[test]
    fn test_dropped_link_maps_to_disconnected() {
        let err = link_error(btleplug::Error::NotConnected, TransportError::Backend);
        assert!(matches!(err, TransportError::Disconnected));
    }

    #[test]
    fn test_other_backend_errors_keep_write_context() {
        let err = link_error(btleplug::Error::DeviceNotFound, |message| {
            TransportError::WriteFailed {
                uuid: OTA_CONTROL_UUID,
                message,
            }
        });
        assert!(matches!(
            err,
            TransportError::WriteFailed { uuid, .. } if uuid == OTA_CONTROL_UUID
        ));
    }
}
