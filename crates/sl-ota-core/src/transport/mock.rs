//! Mock GATT backend for testing.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::traits::{DeviceFilter, GattCentral, GattLink, TransportError};
use crate::protocol::constants::characteristic_name;

fn describe(characteristic: Uuid) -> String {
    match characteristic_name(characteristic) {
        Some(name) => name.to_string(),
        None => characteristic.to_string(),
    }
}

/// Shared, ordered log of every transport operation a test drove.
///
/// Sessions interleave discovery, connects and GATT traffic across two
/// links; the log is the only place that order is visible afterwards.
#[derive(Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<String>>>);

impl OpLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Index of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == entry)
    }

    /// Index of the n-th entry equal to `entry` (0-based n).
    pub fn nth_position(&self, entry: &str, n: usize) -> Option<usize> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.as_str() == entry)
            .map(|(i, _)| i)
            .nth(n)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// Scripted peripheral handle.
#[derive(Debug, Clone)]
pub struct MockPeer {
    pub address: String,
    pub name: Option<String>,
}

impl fmt::Display for MockPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({name})", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Mock central for unit testing session logic.
///
/// Links are scripted up front, one per expected `connect` call, and
/// handed out in order. Tests keep their own clones of each link to
/// inspect traffic afterwards.
pub struct MockCentral {
    links: Arc<Mutex<Vec<MockLink>>>,
    peer: MockPeer,
    discovery_times_out: bool,
    ops: OpLog,
}

impl MockCentral {
    pub fn new(ops: OpLog) -> Self {
        Self {
            links: Arc::new(Mutex::new(Vec::new())),
            peer: MockPeer {
                address: "AA:BB:CC:DD:EE:FF".into(),
                name: Some("mock-device".into()),
            },
            discovery_times_out: false,
            ops,
        }
    }

    /// Script the next link `connect` will produce.
    pub fn push_link(&self, link: &MockLink) {
        self.links.lock().unwrap().push(link.clone());
    }

    /// Make every `discover` call time out.
    pub fn fail_discovery(&mut self) {
        self.discovery_times_out = true;
    }

    pub fn set_peer(&mut self, address: impl Into<String>, name: Option<&str>) {
        self.peer = MockPeer {
            address: address.into(),
            name: name.map(str::to_string),
        };
    }
}

#[async_trait]
impl GattCentral for MockCentral {
    type Peer = MockPeer;
    type Link = MockLink;

    async fn discover(
        &self,
        _filter: &DeviceFilter,
        timeout: Duration,
    ) -> Result<MockPeer, TransportError> {
        if self.discovery_times_out {
            return Err(TransportError::DiscoveryTimeout {
                timeout_secs: timeout.as_secs(),
            });
        }
        self.ops.push("discover");
        Ok(self.peer.clone())
    }

    async fn connect(&self, peer: &MockPeer) -> Result<MockLink, TransportError> {
        let mut links = self.links.lock().unwrap();
        if links.is_empty() {
            return Err(TransportError::ConnectFailed {
                device: peer.address.clone(),
                message: "no scripted link".into(),
            });
        }
        self.ops.push("connect");
        Ok(links.remove(0))
    }
}

/// One scripted GATT connection. Clones share state, so a test can hold
/// a handle while the session consumes another.
#[derive(Clone)]
pub struct MockLink {
    services: Arc<Mutex<Vec<Uuid>>>,
    read_data: Arc<Mutex<HashMap<Uuid, Vec<u8>>>>,
    write_log: Arc<Mutex<Vec<(Uuid, Vec<u8>, bool)>>>,
    write_counts: Arc<Mutex<HashMap<Uuid, usize>>>,
    fail_writes: Arc<Mutex<Vec<(Uuid, usize)>>>,
    drop_writes: Arc<Mutex<Vec<(Uuid, usize)>>>,
    mtu: Option<usize>,
    will_disconnect: bool,
    connected: Arc<Mutex<bool>>,
    ops: OpLog,
}

impl MockLink {
    pub fn new(ops: OpLog, services: &[Uuid]) -> Self {
        Self {
            services: Arc::new(Mutex::new(services.to_vec())),
            read_data: Arc::new(Mutex::new(HashMap::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            write_counts: Arc::new(Mutex::new(HashMap::new())),
            fail_writes: Arc::new(Mutex::new(Vec::new())),
            drop_writes: Arc::new(Mutex::new(Vec::new())),
            mtu: None,
            will_disconnect: false,
            connected: Arc::new(Mutex::new(true)),
            ops,
        }
    }

    /// Stage the value a read of `characteristic` returns.
    pub fn stage_read(&self, characteristic: Uuid, data: &[u8]) {
        self.read_data
            .lock()
            .unwrap()
            .insert(characteristic, data.to_vec());
    }

    /// Error the n-th write (0-based, counted per characteristic).
    pub fn fail_write_at(&self, characteristic: Uuid, index: usize) {
        self.fail_writes.lock().unwrap().push((characteristic, index));
    }

    /// Silently lose the n-th write: the call succeeds but nothing is
    /// captured, like an unacknowledged write the radio dropped.
    pub fn drop_write_at(&self, characteristic: Uuid, index: usize) {
        self.drop_writes.lock().unwrap().push((characteristic, index));
    }

    /// Report `mtu` from `negotiate_mtu`.
    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = Some(mtu);
    }

    /// Script the peripheral dropping the connection when asked to wait.
    pub fn disconnect_on_wait(&mut self) {
        self.will_disconnect = true;
    }

    /// All captured writes as (characteristic, payload, acknowledged).
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>, bool)> {
        self.write_log.lock().unwrap().clone()
    }

    /// Captured payloads for one characteristic, in order.
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.write_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| *c == characteristic)
            .map(|(_, payload, _)| payload.clone())
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}

#[async_trait]
impl GattLink for MockLink {
    async fn services(&self) -> Result<Vec<Uuid>, TransportError> {
        self.ops.push("services");
        Ok(self.services.lock().unwrap().clone())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        self.ops.push(format!("read {}", describe(characteristic)));
        self.read_data
            .lock()
            .unwrap()
            .get(&characteristic)
            .cloned()
            .ok_or(TransportError::ReadFailed {
                uuid: characteristic,
                message: "no staged value".into(),
            })
    }

    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        ack: bool,
    ) -> Result<(), TransportError> {
        let index = {
            let mut counts = self.write_counts.lock().unwrap();
            let slot = counts.entry(characteristic).or_insert(0);
            let index = *slot;
            *slot += 1;
            index
        };

        if self
            .fail_writes
            .lock()
            .unwrap()
            .contains(&(characteristic, index))
        {
            return Err(TransportError::WriteFailed {
                uuid: characteristic,
                message: "scripted failure".into(),
            });
        }

        self.ops.push(format!("write {}", describe(characteristic)));

        if self
            .drop_writes
            .lock()
            .unwrap()
            .contains(&(characteristic, index))
        {
            return Ok(());
        }

        self.write_log
            .lock()
            .unwrap()
            .push((characteristic, payload.to_vec(), ack));
        Ok(())
    }

    async fn negotiate_mtu(&self) -> Option<usize> {
        self.mtu
    }

    async fn await_disconnect(&self, timeout: Duration) -> Result<(), TransportError> {
        self.ops.push("await_disconnect");
        if self.will_disconnect {
            *self.connected.lock().unwrap() = false;
            Ok(())
        } else {
            Err(TransportError::DisconnectTimeout {
                timeout_secs: timeout.as_secs(),
            })
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.ops.push("disconnect");
        *self.connected.lock().unwrap() = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{OTA_CONTROL_UUID, OTA_DATA_UUID, OTA_SERVICE_UUID};

    #[tokio::test]
    async fn test_mock_read_staging() {
        let link = MockLink::new(OpLog::default(), &[OTA_SERVICE_UUID]);
        link.stage_read(OTA_CONTROL_UUID, &[1, 2, 3]);

        assert_eq!(link.read(OTA_CONTROL_UUID).await.unwrap(), vec![1, 2, 3]);
        assert!(link.read(OTA_DATA_UUID).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_write_capture() {
        let link = MockLink::new(OpLog::default(), &[]);
        link.write(OTA_DATA_UUID, b"one", false).await.unwrap();
        link.write(OTA_DATA_UUID, b"two", true).await.unwrap();

        let writes = link.writes_to(OTA_DATA_UUID);
        assert_eq!(writes, vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(!link.writes()[0].2);
        assert!(link.writes()[1].2);
    }

    #[tokio::test]
    async fn test_mock_write_scripting() {
        let link = MockLink::new(OpLog::default(), &[]);
        link.fail_write_at(OTA_DATA_UUID, 1);
        link.drop_write_at(OTA_DATA_UUID, 2);

        assert!(link.write(OTA_DATA_UUID, b"a", false).await.is_ok());
        assert!(link.write(OTA_DATA_UUID, b"b", false).await.is_err());
        // The dropped write reports success but never reaches the log
        assert!(link.write(OTA_DATA_UUID, b"c", false).await.is_ok());
        assert_eq!(link.writes_to(OTA_DATA_UUID), vec![b"a".to_vec()]);
    }

    #[tokio::test]
    async fn test_mock_link_queue_order() {
        let ops = OpLog::default();
        let central = MockCentral::new(ops.clone());
        let first = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        let second = MockLink::new(ops.clone(), &[]);
        central.push_link(&first);
        central.push_link(&second);

        let filter = DeviceFilter::new("mock-device");
        let peer = central
            .discover(&filter, Duration::from_secs(1))
            .await
            .unwrap();
        let a = central.connect(&peer).await.unwrap();
        let b = central.connect(&peer).await.unwrap();
        assert_eq!(a.services().await.unwrap(), vec![OTA_SERVICE_UUID]);
        assert!(b.services().await.unwrap().is_empty());
        assert!(central.connect(&peer).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_disconnect_wait() {
        let mut link = MockLink::new(OpLog::default(), &[]);
        assert!(matches!(
            link.await_disconnect(Duration::from_secs(5)).await,
            Err(TransportError::DisconnectTimeout { timeout_secs: 5 })
        ));

        link.disconnect_on_wait();
        assert!(link.await_disconnect(Duration::from_secs(5)).await.is_ok());
        assert!(!link.is_connected());
    }
}
