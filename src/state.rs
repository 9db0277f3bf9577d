// ABOUTME: Durable per-service deployment state.
// ABOUTME: StateStore trait plus the JSON file-backed implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Outcome of the most recent deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILURE")]
    Failure,
}

/// The persisted record for a single service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceState {
    #[serde(rename = "deploymentID")]
    pub deployment_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<DeploymentStatus>,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state record malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Persistence contract for service state records.
pub trait StateStore: Send + Sync {
    /// Load the record for a service, defaulting to a zero record when none
    /// has been persisted yet.
    fn load(&self, service: &str) -> Result<ServiceState, StateError>;

    /// Persist the record for a service.
    fn save(&self, service: &str, state: &ServiceState) -> Result<(), StateError>;

    /// Delete every persisted record.
    fn purge(&self) -> Result<(), StateError>;
}

/// State store keeping one JSON file per service under a root directory.
#[derive(Debug, Clone)]
pub struct FileBasedStore {
    root: PathBuf,
}

impl FileBasedStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn service_path(&self, service: &str) -> PathBuf {
        self.root.join(format!("{}.json", service))
    }
}

impl StateStore for FileBasedStore {
    fn load(&self, service: &str) -> Result<ServiceState, StateError> {
        let data = match std::fs::read(self.service_path(service)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ServiceState::default());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&data)?)
    }

    fn save(&self, service: &str, state: &ServiceState) -> Result<(), StateError> {
        std::fs::create_dir_all(&self.root)?;
        let data = serde_json::to_vec(state)?;
        std::fs::write(self.service_path(service), data)?;
        Ok(())
    }

    fn purge(&self) -> Result<(), StateError> {
        debug!("purging state");
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }

            debug!(path = %entry.path().display(), "purging file");
            std::fs::remove_file(entry.path())?;
        }

        Ok(())
    }
}
