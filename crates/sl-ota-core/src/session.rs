//! OTA session - high-level orchestrator for the update flow.
//!
//! AppLoader mode runs the two-connection dance: connect to the running
//! application, ask it to reboot into the bootloader, wait for the
//! device-initiated disconnect, reconnect, probe versions and stream the
//! image. Application-based mode uses a single connection and leaves the
//! staging work to the firmware itself.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::OtaError;
use crate::events::{OtaEvent, OtaObserver, TracingObserver};
use crate::payload::{FirmwareImage, ImageError, TransferPlan, TransferProgress, throughput};
use crate::protocol::constants::{
    APPLICATION_SETTLE_MS, APPLICATION_VERSION_UUID, APPLOADER_VERSION_UUID, CMD_FINISH, CMD_START,
    DEFAULT_ATT_MTU, GECKO_BOOTLOADER_VERSION_UUID, OTA_CONTROL_UUID, OTA_DATA_UUID,
    OTA_SERVICE_UUID, OTA_VERSION_UUID, UNACKED_WRITE_GAP_MS,
};
use crate::protocol::version::{
    AppLoaderVersion, BootloaderVersion, VersionInfo, parse_application_version, parse_ota_version,
};
use crate::state::{OtaState, UpdateMode};
use crate::transport::{DeviceFilter, GattCentral, GattLink, TransportError};

/// Configuration for an OTA session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// BD address or advertised name of the target.
    pub device: String,
    /// Path to the GBL upgrade image.
    pub firmware_path: Option<String>,
    /// Acknowledged data writes, slower but lossless.
    pub reliable: bool,
    /// Which side of the target applies the update.
    pub mode: UpdateMode,
    /// Scan budget in seconds.
    pub discovery_timeout_secs: u64,
    /// How long to wait for the reboot disconnect, seconds.
    pub disconnect_timeout_secs: u64,
    /// Assume this ATT MTU instead of asking the backend.
    pub mtu: Option<usize>,
    /// Pause after each unacknowledged data write, milliseconds.
    pub write_gap_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            firmware_path: None,
            reliable: false,
            mode: UpdateMode::default(),
            discovery_timeout_secs: 30,
            disconnect_timeout_secs: 30,
            mtu: None,
            write_gap_ms: UNACKED_WRITE_GAP_MS,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// What a completed update looked like.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub device: String,
    pub versions: VersionInfo,
    pub bytes_sent: usize,
    pub chunks_sent: usize,
    pub elapsed_secs: f64,
    pub bytes_per_sec: f64,
    pub bits_per_sec: f64,
}

/// OTA session - drives one firmware update end to end.
pub struct OtaSession<C: GattCentral, O: OtaObserver> {
    config: SessionConfig,
    central: C,
    observer: Arc<O>,
    state: OtaState,
}

impl<C: GattCentral> OtaSession<C, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(central: C, config: SessionConfig) -> Self {
        Self::with_observer(central, config, Arc::new(TracingObserver))
    }
}

impl<C: GattCentral, O: OtaObserver + 'static> OtaSession<C, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(central: C, config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            central,
            observer,
            state: OtaState::Idle,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    fn goto_state(&mut self, to: OtaState) {
        let from = std::mem::replace(&mut self.state, to);
        self.observer.on_event(&OtaEvent::StateChanged { from, to });
    }

    fn fail(&mut self, err: OtaError) -> OtaError {
        self.goto_state(OtaState::Failed);
        self.observer.on_event(&OtaEvent::Failed {
            message: err.to_string(),
        });
        err
    }

    /// Run the complete update using the image path from the config.
    #[instrument(skip(self), fields(device = %self.config.device, mode = %self.config.mode))]
    pub async fn run(&mut self) -> Result<UpdateReport, OtaError> {
        let image = match self.load_image() {
            Ok(image) => image,
            Err(e) => return Err(self.fail(e)),
        };
        self.flash(&image).await
    }

    /// Run the complete update with an already-loaded image.
    pub async fn flash(&mut self, image: &FirmwareImage) -> Result<UpdateReport, OtaError> {
        match self.try_flash(image).await {
            Ok(report) => {
                self.goto_state(OtaState::Done);
                self.observer.on_event(&OtaEvent::Complete);
                Ok(report)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Discover, connect, read the version characteristics, disconnect.
    /// Never writes to the target.
    #[instrument(skip(self), fields(device = %self.config.device))]
    pub async fn probe(&mut self) -> Result<VersionInfo, OtaError> {
        match self.try_probe().await {
            Ok(info) => {
                self.goto_state(OtaState::Done);
                Ok(info)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn load_image(&self) -> Result<FirmwareImage, OtaError> {
        match &self.config.firmware_path {
            Some(path) => {
                info!(path = %path, "Loading firmware image");
                Ok(FirmwareImage::load(path)?)
            }
            None => Err(OtaError::InvalidImage(ImageError::PathMissing)),
        }
    }

    async fn try_flash(&mut self, image: &FirmwareImage) -> Result<UpdateReport, OtaError> {
        let filter = DeviceFilter::new(&self.config.device);

        self.goto_state(OtaState::Discovering);
        let peer = self.discover(&filter).await?;
        self.observer.on_event(&OtaEvent::DeviceFound {
            device: peer.to_string(),
        });

        match self.config.mode {
            UpdateMode::AppLoader => self.flash_via_apploader(&peer, image).await,
            UpdateMode::Application => self.flash_via_application(&peer, image).await,
        }
    }

    async fn try_probe(&mut self) -> Result<VersionInfo, OtaError> {
        let filter = DeviceFilter::new(&self.config.device);

        self.goto_state(OtaState::Discovering);
        let peer = self.discover(&filter).await?;
        self.observer.on_event(&OtaEvent::DeviceFound {
            device: peer.to_string(),
        });

        self.goto_state(OtaState::ConnectedApp);
        let link = self.connect_and_verify(&peer, false).await?;

        self.goto_state(OtaState::ProbingVersion);
        let info = self.read_versions(&link).await;
        self.observer.on_event(&OtaEvent::Versions { info });

        let _ = link.disconnect().await;
        Ok(info)
    }

    /// Standalone bootloader flow: trigger a reboot from the application,
    /// then reconnect to the AppLoader and stream.
    async fn flash_via_apploader(
        &mut self,
        peer: &C::Peer,
        image: &FirmwareImage,
    ) -> Result<UpdateReport, OtaError> {
        self.goto_state(OtaState::ConnectedApp);
        let app_link = self.connect_and_verify(peer, false).await?;

        self.goto_state(OtaState::TriggeringReboot);
        if let Err(e) = app_link.write(OTA_CONTROL_UUID, &[CMD_START], true).await {
            let _ = app_link.disconnect().await;
            return Err(OtaError::CharacteristicIo(e));
        }
        self.observer.on_event(&OtaEvent::RebootRequested);

        self.goto_state(OtaState::AwaitingReboot);
        let wait = Duration::from_secs(self.config.disconnect_timeout_secs);
        if let Err(e) = app_link.await_disconnect(wait).await {
            let _ = app_link.disconnect().await;
            return Err(match e {
                TransportError::DisconnectTimeout { timeout_secs } => {
                    OtaError::DisconnectTimeout { timeout_secs }
                }
                other => OtaError::Transport(other),
            });
        }
        self.observer.on_event(&OtaEvent::DeviceRebooted);

        self.goto_state(OtaState::ConnectedBootloader);
        let bl_link = self.connect_and_verify(peer, true).await?;

        self.goto_state(OtaState::ProbingVersion);
        let versions = self.read_versions(&bl_link).await;
        self.observer.on_event(&OtaEvent::Versions { info: versions });

        let report = self.upload(&bl_link, image, versions, false).await;
        let _ = bl_link.disconnect().await;
        report
    }

    /// Application-based flow: the running firmware stages the image, so
    /// one connection carries the whole update.
    async fn flash_via_application(
        &mut self,
        peer: &C::Peer,
        image: &FirmwareImage,
    ) -> Result<UpdateReport, OtaError> {
        self.goto_state(OtaState::ConnectedApp);
        let link = self.connect_and_verify(peer, false).await?;

        let report = self.upload(&link, image, VersionInfo::default(), true).await;
        let _ = link.disconnect().await;
        report
    }

    async fn discover(&mut self, filter: &DeviceFilter) -> Result<C::Peer, OtaError> {
        let timeout = Duration::from_secs(self.config.discovery_timeout_secs);
        self.central
            .discover(filter, timeout)
            .await
            .map_err(|e| match e {
                TransportError::DiscoveryTimeout { timeout_secs } => OtaError::DiscoveryTimeout {
                    device: self.config.device.clone(),
                    timeout_secs,
                },
                other => OtaError::Transport(other),
            })
    }

    /// Connect and check the OTA service is present. The same failure
    /// means different things per phase: before the reboot request a
    /// missing service is the operator's problem (wrong device, firmware
    /// without OTA hooks); after it, the reboot did not produce a
    /// bootloader.
    async fn connect_and_verify(
        &mut self,
        peer: &C::Peer,
        entering_bootloader: bool,
    ) -> Result<C::Link, OtaError> {
        let link = self.central.connect(peer).await.map_err(|e| {
            if entering_bootloader {
                OtaError::BootloaderEntry {
                    reason: e.to_string(),
                }
            } else {
                OtaError::Transport(e)
            }
        })?;

        let services = match link.services().await {
            Ok(services) => services,
            Err(e) => {
                let _ = link.disconnect().await;
                return Err(if entering_bootloader {
                    OtaError::BootloaderEntry {
                        reason: e.to_string(),
                    }
                } else {
                    OtaError::Transport(e)
                });
            }
        };

        if !services.contains(&OTA_SERVICE_UUID) {
            let _ = link.disconnect().await;
            return Err(if entering_bootloader {
                OtaError::BootloaderEntry {
                    reason: "OTA service missing after reboot".into(),
                }
            } else {
                OtaError::MissingService
            });
        }

        Ok(link)
    }

    /// Best-effort read of every version characteristic. Failures are
    /// logged and leave the field unset; the update proceeds either way.
    async fn read_versions(&self, link: &C::Link) -> VersionInfo {
        let mut info = VersionInfo::default();

        match link.read(APPLOADER_VERSION_UUID).await {
            Ok(data) => match AppLoaderVersion::from_bytes(&data) {
                Ok(v) => info.apploader = Some(v),
                Err(e) => warn!(error = %e, "Bad AppLoader version data"),
            },
            Err(e) => warn!(error = %e, "AppLoader version read failed"),
        }

        match link.read(OTA_VERSION_UUID).await {
            Ok(data) => match parse_ota_version(&data) {
                Ok(v) => info.ota_protocol = Some(v),
                Err(e) => warn!(error = %e, "Bad OTA version data"),
            },
            Err(e) => warn!(error = %e, "OTA version read failed"),
        }

        match link.read(GECKO_BOOTLOADER_VERSION_UUID).await {
            Ok(data) => match BootloaderVersion::from_bytes(&data) {
                Ok(v) => info.bootloader = Some(v),
                Err(e) => warn!(error = %e, "Bad Gecko bootloader version data"),
            },
            Err(e) => warn!(error = %e, "Gecko bootloader version read failed"),
        }

        // Optional; most firmware does not publish it
        match link.read(APPLICATION_VERSION_UUID).await {
            Ok(data) => match parse_application_version(&data) {
                Ok(v) => info.application = Some(v),
                Err(e) => debug!(error = %e, "Bad application version data"),
            },
            Err(e) => debug!(error = %e, "No application version"),
        }

        info
    }

    /// Arm the loader and stream the image over one link. The elapsed
    /// window covers the first data write through FINISH completion.
    async fn upload(
        &mut self,
        link: &C::Link,
        image: &FirmwareImage,
        versions: VersionInfo,
        settle_first: bool,
    ) -> Result<UpdateReport, OtaError> {
        self.goto_state(OtaState::Uploading);

        // START must be issued on this connection even when the app
        // already got one before the reboot
        link.write(OTA_CONTROL_UUID, &[CMD_START], true)
            .await
            .map_err(OtaError::CharacteristicIo)?;

        if settle_first {
            // Give the firmware time to erase its staging slot
            tokio::time::sleep(Duration::from_millis(APPLICATION_SETTLE_MS)).await;
        }

        let mtu = match self.config.mtu {
            Some(mtu) => mtu,
            None => link.negotiate_mtu().await.unwrap_or(DEFAULT_ATT_MTU),
        };
        let plan = TransferPlan::new(image.len(), mtu, self.config.reliable);
        self.observer.on_event(&OtaEvent::UploadStarted {
            total_bytes: plan.total_bytes,
            chunk_count: plan.chunk_count,
            chunk_size: plan.chunk_size,
        });

        let gap = Duration::from_millis(self.config.write_gap_ms);
        let mut progress = TransferProgress::default();
        let started = Instant::now();

        for chunk in image.chunks(plan.chunk_size) {
            link.write(OTA_DATA_UUID, chunk, plan.reliable)
                .await
                .map_err(OtaError::CharacteristicIo)?;
            if !plan.reliable && !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }
            progress.record(chunk.len());
            self.observer.on_event(&OtaEvent::ChunkSent {
                index: progress.chunks_sent,
                total: plan.chunk_count,
                bytes: chunk.len(),
            });
        }

        self.goto_state(OtaState::Finalizing);
        link.write(OTA_CONTROL_UUID, &[CMD_FINISH], true)
            .await
            .map_err(OtaError::CharacteristicIo)?;

        let elapsed_secs = started.elapsed().as_secs_f64();
        let (bytes_per_sec, bits_per_sec) = throughput(progress.bytes_sent, elapsed_secs);
        self.observer.on_event(&OtaEvent::UploadFinished {
            bytes: progress.bytes_sent,
            elapsed_secs,
            bytes_per_sec,
            bits_per_sec,
        });

        Ok(UpdateReport {
            device: self.config.device.clone(),
            versions,
            bytes_sent: progress.bytes_sent,
            chunks_sent: progress.chunks_sent,
            elapsed_secs,
            bytes_per_sec,
            bits_per_sec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockCentral, MockLink, OpLog};

    fn test_config() -> SessionConfig {
        SessionConfig {
            device: "mock-device".into(),
            reliable: false,
            discovery_timeout_secs: 1,
            disconnect_timeout_secs: 1,
            write_gap_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn test_image(len: usize) -> FirmwareImage {
        FirmwareImage::from_bytes((0..len).map(|i| (i % 251) as u8).collect()).unwrap()
    }

    /// Central scripted for the happy two-phase flow: an app link that
    /// reboots on request and a bootloader link ready for the upload.
    fn apploader_fixture(ops: &OpLog) -> (MockCentral, MockLink, MockLink) {
        let central = MockCentral::new(ops.clone());
        let mut app_link = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        app_link.disconnect_on_wait();
        let bl_link = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        central.push_link(&app_link);
        central.push_link(&bl_link);
        (central, app_link, bl_link)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_apploader_flow() {
        let ops = OpLog::default();
        let (central, app_link, bl_link) = apploader_fixture(&ops);
        let mut session = OtaSession::new(central, test_config());

        let image = test_image(300);
        let report = session.flash(&image).await.unwrap();

        assert_eq!(session.state(), OtaState::Done);
        assert_eq!(report.bytes_sent, 300);
        assert_eq!(report.chunks_sent, 15);

        // App phase: one acknowledged START, nothing else
        let app_control = app_link.writes_to(OTA_CONTROL_UUID);
        assert_eq!(app_control, vec![vec![CMD_START]]);
        assert!(app_link.writes_to(OTA_DATA_UUID).is_empty());

        // Bootloader phase: START again, the data stream, then FINISH
        let bl_control = bl_link.writes_to(OTA_CONTROL_UUID);
        assert_eq!(bl_control, vec![vec![CMD_START], vec![CMD_FINISH]]);
        let data = bl_link.writes_to(OTA_DATA_UUID);
        assert_eq!(data.len(), 15);
        assert!(data.iter().all(|c| c.len() == 20));
        let rejoined: Vec<u8> = data.concat();
        assert_eq!(rejoined, image.as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_only_after_disconnect_observed() {
        let ops = OpLog::default();
        let (central, _app, _bl) = apploader_fixture(&ops);
        let mut session = OtaSession::new(central, test_config());

        session.flash(&test_image(40)).await.unwrap();

        let wait_at = ops.position("await_disconnect").unwrap();
        let second_connect_at = ops.nth_position("connect", 1).unwrap();
        assert!(
            wait_at < second_connect_at,
            "bootloader connect happened before the app dropped the link: {:?}",
            ops.entries()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_service_stops_before_reboot_write() {
        let ops = OpLog::default();
        let central = MockCentral::new(ops.clone());
        let bare_link = MockLink::new(ops.clone(), &[]);
        central.push_link(&bare_link);
        let mut session = OtaSession::new(central, test_config());

        let err = session.flash(&test_image(40)).await.unwrap_err();
        assert!(matches!(err, OtaError::MissingService));
        assert_eq!(session.state(), OtaState::Failed);
        assert!(bare_link.writes().is_empty());
        // The useless link is not left open
        assert_eq!(ops.count("disconnect"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_residual_chunking() {
        let ops = OpLog::default();
        let (central, _app, bl_link) = apploader_fixture(&ops);
        let mut session = OtaSession::new(central, test_config());

        session.flash(&test_image(301)).await.unwrap();

        let data = bl_link.writes_to(OTA_DATA_UUID);
        assert_eq!(data.len(), 16);
        assert_eq!(data[14].len(), 20);
        assert_eq!(data[15].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mtu_override_controls_chunking() {
        let ops = OpLog::default();
        let (central, _app, bl_link) = apploader_fixture(&ops);
        let config = SessionConfig {
            mtu: Some(100),
            ..test_config()
        };
        let mut session = OtaSession::new(central, config);

        session.flash(&test_image(300)).await.unwrap();

        let data = bl_link.writes_to(OTA_DATA_UUID);
        assert_eq!(data.len(), 4);
        assert_eq!(data[0].len(), 97);
        assert_eq!(data[3].len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_mtu_used_when_reported() {
        let ops = OpLog::default();
        let central = MockCentral::new(ops.clone());
        let mut app_link = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        app_link.disconnect_on_wait();
        let mut bl_link = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        bl_link.set_mtu(63);
        central.push_link(&app_link);
        central.push_link(&bl_link);
        let mut session = OtaSession::new(central, test_config());

        session.flash(&test_image(300)).await.unwrap();

        let data = bl_link.writes_to(OTA_DATA_UUID);
        assert_eq!(data.len(), 5);
        assert!(data.iter().all(|c| c.len() == 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acked_write_failure_halts_upload() {
        let ops = OpLog::default();
        let (central, _app, bl_link) = apploader_fixture(&ops);
        bl_link.fail_write_at(OTA_DATA_UUID, 3);
        let config = SessionConfig {
            reliable: true,
            ..test_config()
        };
        let mut session = OtaSession::new(central, config);

        let err = session.flash(&test_image(300)).await.unwrap_err();
        assert!(matches!(err, OtaError::CharacteristicIo(_)));
        assert_eq!(session.state(), OtaState::Failed);

        // Three chunks made it out; FINISH was never sent
        assert_eq!(bl_link.writes_to(OTA_DATA_UUID).len(), 3);
        assert_eq!(bl_link.writes_to(OTA_CONTROL_UUID), vec![vec![CMD_START]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacked_drop_is_not_fatal() {
        let ops = OpLog::default();
        let (central, _app, bl_link) = apploader_fixture(&ops);
        bl_link.drop_write_at(OTA_DATA_UUID, 2);
        let mut session = OtaSession::new(central, test_config());

        let report = session.flash(&test_image(300)).await.unwrap();

        // The session believes it sent everything; the wire disagrees
        assert_eq!(report.chunks_sent, 15);
        let data = bl_link.writes_to(OTA_DATA_UUID);
        assert_eq!(data.len(), 14);
        let bl_control = bl_link.writes_to(OTA_CONTROL_UUID);
        assert_eq!(bl_control, vec![vec![CMD_START], vec![CMD_FINISH]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_timeout_opens_no_session() {
        let ops = OpLog::default();
        let mut central = MockCentral::new(ops.clone());
        central.fail_discovery();
        let mut session = OtaSession::new(central, test_config());

        let err = session.flash(&test_image(40)).await.unwrap_err();
        assert!(matches!(err, OtaError::DiscoveryTimeout { .. }));
        assert_eq!(session.state(), OtaState::Failed);
        assert_eq!(ops.count("connect"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_timeout_releases_app_link() {
        let ops = OpLog::default();
        let central = MockCentral::new(ops.clone());
        // Link that never drops the connection after the reboot request
        let stuck_link = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        central.push_link(&stuck_link);
        let mut session = OtaSession::new(central, test_config());

        let err = session.flash(&test_image(40)).await.unwrap_err();
        assert!(matches!(err, OtaError::DisconnectTimeout { .. }));
        assert_eq!(ops.count("connect"), 1);
        assert!(!stuck_link.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootloader_missing_service_is_entry_failure() {
        let ops = OpLog::default();
        let central = MockCentral::new(ops.clone());
        let mut app_link = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        app_link.disconnect_on_wait();
        // Whatever came back after the reboot does not speak OTA
        let impostor = MockLink::new(ops.clone(), &[]);
        central.push_link(&app_link);
        central.push_link(&impostor);
        let mut session = OtaSession::new(central, test_config());

        let err = session.flash(&test_image(40)).await.unwrap_err();
        assert!(matches!(err, OtaError::BootloaderEntry { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_application_mode_single_connection() {
        let ops = OpLog::default();
        let central = MockCentral::new(ops.clone());
        let link = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        central.push_link(&link);
        let config = SessionConfig {
            mode: UpdateMode::Application,
            ..test_config()
        };
        let mut session = OtaSession::new(central, config);

        let report = session.flash(&test_image(300)).await.unwrap();

        assert_eq!(report.chunks_sent, 15);
        assert_eq!(ops.count("connect"), 1);
        assert_eq!(ops.count("await_disconnect"), 0);
        assert_eq!(
            link.writes_to(OTA_CONTROL_UUID),
            vec![vec![CMD_START], vec![CMD_FINISH]]
        );
        assert_eq!(link.writes_to(OTA_DATA_UUID).len(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_probe_failure_is_not_fatal() {
        let ops = OpLog::default();
        // Nothing staged on the bootloader link: every version read fails
        let (central, _app, _bl) = apploader_fixture(&ops);
        let mut session = OtaSession::new(central, test_config());

        let report = session.flash(&test_image(40)).await.unwrap();
        assert!(report.versions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_probe_decodes_characteristics() {
        let ops = OpLog::default();
        let (central, _app, bl_link) = apploader_fixture(&ops);
        bl_link.stage_read(APPLOADER_VERSION_UUID, &[1, 0, 2, 0, 3, 0, 4, 0]);
        bl_link.stage_read(OTA_VERSION_UUID, &[3]);
        bl_link.stage_read(GECKO_BOOTLOADER_VERSION_UUID, &[1, 10, 0xA2, 0x01]);
        let mut session = OtaSession::new(central, test_config());

        let report = session.flash(&test_image(40)).await.unwrap();
        assert_eq!(
            report.versions.to_string(),
            "AppLoader 1.2.3-4, OTA: 3, Gecko 1.10, customer: 0x01a2"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_is_read_only() {
        let ops = OpLog::default();
        let central = MockCentral::new(ops.clone());
        let link = MockLink::new(ops.clone(), &[OTA_SERVICE_UUID]);
        link.stage_read(APPLOADER_VERSION_UUID, &[9, 0, 0, 0, 1, 0, 7, 0]);
        central.push_link(&link);
        let mut session = OtaSession::new(central, test_config());

        let info = session.probe().await.unwrap();
        assert_eq!(
            info.apploader,
            Some(AppLoaderVersion {
                major: 9,
                minor: 0,
                patch: 1,
                build: 7
            })
        );
        assert_eq!(session.state(), OtaState::Done);
        assert!(link.writes().is_empty());
        assert_eq!(ops.count("disconnect"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_without_image_path_fails_early() {
        let ops = OpLog::default();
        let central = MockCentral::new(ops.clone());
        let mut session = OtaSession::new(central, test_config());

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, OtaError::InvalidImage(_)));
        assert_eq!(ops.count("discover"), 0);
    }
}
