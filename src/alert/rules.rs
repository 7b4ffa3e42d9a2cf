use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    SyncLost,
    DriftDetected,
    SyncRestored,
}

impl AlertEventKind {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::SyncLost => "sync_lost",
            Self::DriftDetected => "drift_detected",
            Self::SyncRestored => "sync_restored",
        }
    }
}

impl Display for AlertEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::SyncLost => "Connection lost",
            Self::DriftDetected => "Drift detected",
            Self::SyncRestored => "Back in sync",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertRules {
    #[serde(default = "default_true")]
    pub sync_lost: bool,
    #[serde(default = "default_true")]
    pub drift_detected: bool,
    #[serde(default = "default_true")]
    pub sync_restored: bool,
}

impl AlertRules {
    pub fn allows(&self, kind: AlertEventKind) -> bool {
        match kind {
            AlertEventKind::SyncLost => self.sync_lost,
            AlertEventKind::DriftDetected => self.drift_detected,
            AlertEventKind::SyncRestored => self.sync_restored,
        }
    }
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            sync_lost: true,
            drift_detected: true,
            sync_restored: true,
        }
    }
}

fn default_true() -> bool {
    true
}
