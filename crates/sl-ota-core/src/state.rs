//! Update flow states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an update session currently stands.
///
/// AppLoader mode walks the full sequence; application-based mode skips
/// the reboot leg (`TriggeringReboot` through `ProbingVersion`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    /// Nothing started yet.
    Idle,
    /// Scanning for the target peripheral.
    Discovering,
    /// Connected to the running application.
    ConnectedApp,
    /// START sent to the application; reboot requested.
    TriggeringReboot,
    /// Waiting for the application to drop the connection.
    AwaitingReboot,
    /// Connected to the AppLoader after the reboot.
    ConnectedBootloader,
    /// Reading version characteristics.
    ProbingVersion,
    /// Streaming firmware chunks.
    Uploading,
    /// FINISH sent; the target verifies and applies.
    Finalizing,
    /// Update accepted.
    Done,
    /// Update aborted; the returned error carries the reason.
    Failed,
}

impl Default for OtaState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for OtaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaState::Idle => write!(f, "IDLE"),
            OtaState::Discovering => write!(f, "DISCOVERING"),
            OtaState::ConnectedApp => write!(f, "CONNECTED_APP"),
            OtaState::TriggeringReboot => write!(f, "TRIGGERING_REBOOT"),
            OtaState::AwaitingReboot => write!(f, "AWAITING_REBOOT"),
            OtaState::ConnectedBootloader => write!(f, "CONNECTED_BOOTLOADER"),
            OtaState::ProbingVersion => write!(f, "PROBING_VERSION"),
            OtaState::Uploading => write!(f, "UPLOADING"),
            OtaState::Finalizing => write!(f, "FINALIZING"),
            OtaState::Done => write!(f, "DONE"),
            OtaState::Failed => write!(f, "FAILED"),
        }
    }
}

impl OtaState {
    /// Check if the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OtaState::Done | OtaState::Failed)
    }
}

/// Which side of the target performs the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Standalone bootloader: reboot into AppLoader, reconnect, stream.
    AppLoader,
    /// The running application stages the image itself; no reboot cycle.
    Application,
}

impl Default for UpdateMode {
    fn default() -> Self {
        Self::AppLoader
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::AppLoader => write!(f, "apploader"),
            UpdateMode::Application => write!(f, "application"),
        }
    }
}
