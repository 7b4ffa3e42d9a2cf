pub mod compare;
pub mod ledger;

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::fetch::http::fetch_text;
use crate::version::compare::compare_versions;
use crate::version::ledger::find_release;

pub const FALLBACK_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum VersionAdvisory {
    NoUpdate {
        current: String,
    },
    UpdateAvailable {
        current: String,
        latest: String,
        url: Option<String>,
    },
    Error {
        current: String,
    },
}

impl VersionAdvisory {
    pub fn current(&self) -> &str {
        match self {
            Self::NoUpdate { current }
            | Self::UpdateAvailable { current, .. }
            | Self::Error { current } => current,
        }
    }
}

/// Version of the running build. A configured JSON descriptor wins over the crate
/// metadata; an unreadable descriptor yields [`FALLBACK_VERSION`].
pub fn running_version(descriptor: Option<&Path>) -> String {
    let Some(path) = descriptor else {
        return env!("CARGO_PKG_VERSION").to_string();
    };
    let version = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|value| {
            value
                .get("version")
                .and_then(Value::as_str)
                .map(|v| v.trim().to_string())
        })
        .filter(|v| !v.is_empty());
    match version {
        Some(version) => version,
        None => {
            debug!("no version in descriptor {}", path.display());
            FALLBACK_VERSION.to_string()
        }
    }
}

pub fn advisory_from_ledger(body: &str, app_name: &str, current: &str) -> Result<VersionAdvisory> {
    let current = current.to_string();
    let Some(entry) = find_release(body, app_name)? else {
        return Ok(VersionAdvisory::NoUpdate { current });
    };
    if compare_versions(&entry.version, &current) == Ordering::Greater {
        Ok(VersionAdvisory::UpdateAvailable {
            current,
            latest: entry.version,
            url: entry.update_url,
        })
    } else {
        Ok(VersionAdvisory::NoUpdate { current })
    }
}

#[derive(Debug, Clone)]
pub struct VersionChecker {
    client: Client,
    app_name: String,
    ledger_url: String,
    current: String,
}

impl VersionChecker {
    pub fn new(
        client: Client,
        app_name: impl Into<String>,
        ledger_url: impl Into<String>,
        current: impl Into<String>,
    ) -> Self {
        Self {
            client,
            app_name: app_name.into(),
            ledger_url: ledger_url.into(),
            current: current.into(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub async fn check(&self) -> VersionAdvisory {
        match self.try_check().await {
            Ok(advisory) => advisory,
            Err(error) => {
                debug!("version check failed: {error:#}");
                VersionAdvisory::Error {
                    current: self.current.clone(),
                }
            }
        }
    }

    async fn try_check(&self) -> Result<VersionAdvisory> {
        if self.ledger_url.trim().is_empty() {
            bail!("no release ledger configured");
        }
        let body = fetch_text(&self.client, &self.ledger_url).await?;
        advisory_from_ledger(&body, &self.app_name, &self.current)
    }
}

pub fn spawn_version_check<F>(checker: VersionChecker, on_result: F) -> JoinHandle<()>
where
    F: FnOnce(VersionAdvisory) + Send + 'static,
{
    tokio::spawn(async move {
        let advisory = checker.check().await;
        if let VersionAdvisory::UpdateAvailable { latest, .. } = &advisory {
            info!("update available: {} -> {latest}", checker.current());
        }
        on_result(advisory);
    })
}
