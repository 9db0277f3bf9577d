// ABOUTME: Engine configuration loaded from /etc/guvnor/config.yaml.
// ABOUTME: Carries the caddy block and the config/state directory paths.

use crate::caddy;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/guvnor/config.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Reverse-proxy configuration.
    #[serde(default)]
    pub caddy: caddy::Config,

    /// Filesystem locations used by the engine.
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsConfig {
    /// Directory containing "<svc>.yaml" service files.
    pub config: PathBuf,
    /// Directory for per-service state records.
    pub state: PathBuf,
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
                _ => Error::Io(e),
            })?;
        Self::from_yaml(&content)
    }
}
