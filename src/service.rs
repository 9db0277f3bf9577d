// ABOUTME: Service configuration model with defaults inheritance.
// ABOUTME: Parses "<svc>.yaml" files and resolves process/task settings.

use crate::error::{Error, Result};
use crate::ready;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

/// A declarative service: defaults, long-running processes, one-shot tasks,
/// and deployment callbacks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceConfig {
    /// The unique identifier of the service, derived from the name of the
    /// file it was loaded from.
    #[serde(skip)]
    pub name: String,

    /// Configuration values used by default for process and task containers.
    #[serde(default)]
    pub defaults: ServiceDefaults,

    /// Long-running processes to deploy as part of this service.
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessConfig>,

    /// One-shot tasks that can be invoked as part of this service.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,

    /// Tasks to run when specific deployment events occur.
    #[serde(default)]
    pub callbacks: CallbacksConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CallbacksConfig {
    #[serde(default)]
    pub pre_deployment: Vec<String>,
    #[serde(default)]
    pub post_deployment: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceDefaults {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub image_pull: Option<bool>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    #[serde(default)]
    pub network: NetworkConfig,

    /// Default user/group for task and process containers.
    ///
    /// The following formats are valid:
    /// [ user | user:group | uid | uid:gid | user:gid | uid:group ]
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MountConfig {
    pub host: String,
    pub container: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Default,
    Host,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkConfig {
    /// Unset inherits the defaults block.
    #[serde(default)]
    pub mode: Option<NetworkMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcessCaddyConfig {
    /// Hostnames to route to this process. Empty means the process is not
    /// load-balanced.
    #[serde(default)]
    pub hostnames: Vec<String>,
    /// Optional path prefix to match.
    #[serde(default)]
    pub path: String,
}

/// How a process's replicas are rolled during a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStrategy {
    /// Start a new replica, wait for it to become healthy, direct traffic to
    /// it, then tell an old replica to terminate.
    #[default]
    Default,
    /// Remove an old replica from the load balancer and stop it, then start
    /// its replacement.
    Replace,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcessConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub image_pull: Option<bool>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    #[serde(default)]
    pub caddy: ProcessCaddyConfig,

    /// Grants all capabilities to the container.
    #[serde(default)]
    pub privileged: bool,

    /// User/group for the process container, overriding the defaults block.
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub ready_check: Option<ready::Check>,
    #[serde(default)]
    pub deployment_strategy: Option<DeploymentStrategy>,

    /// How long a replica is given to shut down before the engine kills it.
    #[serde(
        default = "default_shutdown_grace_period",
        with = "humantime_serde"
    )]
    pub shutdown_grace_period: Duration,
}

fn default_shutdown_grace_period() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub image_pull: Option<bool>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    #[serde(default)]
    pub network: NetworkConfig,

    /// User/group for the task container, overriding the defaults block.
    #[serde(default)]
    pub user: String,
}

// =============================================================================
// Resolution helpers
// =============================================================================

/// Resolve an image reference from the defaults block and an override pair,
/// applying an optional tag override on top.
fn resolve_image(
    defaults: &ServiceDefaults,
    image: &str,
    image_tag: &str,
    tag_override: Option<&str>,
) -> Result<String> {
    let (name, tag) = if image.is_empty() {
        (defaults.image.as_str(), defaults.image_tag.as_str())
    } else {
        if image_tag.is_empty() {
            return Err(Error::Configuration(
                "imageTag must be specified when image specified".to_string(),
            ));
        }
        (image, image_tag)
    };

    let tag = tag_override.unwrap_or(tag);
    Ok(format!("{}:{}", name, tag))
}

/// Merge environment layers; later layers override earlier ones.
pub fn merge_env(layers: &[&HashMap<String, String>]) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Concatenate mount lists; defaults first, no deduplication.
pub fn merge_mounts(a: &[MountConfig], b: &[MountConfig]) -> Vec<MountConfig> {
    a.iter().chain(b.iter()).cloned().collect()
}

fn resolve_user(defaults: &ServiceDefaults, user: &str) -> Option<String> {
    let user = if user.is_empty() { &defaults.user } else { user };
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}

fn resolve_host_network(defaults: &ServiceDefaults, network: &NetworkConfig) -> bool {
    match network.mode.or(defaults.network.mode) {
        Some(NetworkMode::Host) => true,
        Some(NetworkMode::Default) | None => false,
    }
}

fn resolve_image_pull(defaults: &ServiceDefaults, image_pull: Option<bool>) -> bool {
    image_pull.or(defaults.image_pull).unwrap_or(true)
}

impl ProcessConfig {
    pub fn image(&self, defaults: &ServiceDefaults, tag_override: Option<&str>) -> Result<String> {
        resolve_image(defaults, &self.image, &self.image_tag, tag_override)
    }

    pub fn image_pull(&self, defaults: &ServiceDefaults) -> bool {
        resolve_image_pull(defaults, self.image_pull)
    }

    pub fn mounts(&self, defaults: &ServiceDefaults) -> Vec<MountConfig> {
        merge_mounts(&defaults.mounts, &self.mounts)
    }

    pub fn user(&self, defaults: &ServiceDefaults) -> Option<String> {
        resolve_user(defaults, &self.user)
    }

    pub fn host_network(&self, defaults: &ServiceDefaults) -> bool {
        resolve_host_network(defaults, &self.network)
    }

    /// Number of replicas to run. Zero means unspecified and defaults to one.
    pub fn quantity(&self) -> u32 {
        if self.quantity == 0 { 1 } else { self.quantity }
    }

    pub fn strategy(&self) -> DeploymentStrategy {
        self.deployment_strategy.unwrap_or_default()
    }
}

impl TaskConfig {
    pub fn image(&self, defaults: &ServiceDefaults) -> Result<String> {
        resolve_image(defaults, &self.image, &self.image_tag, None)
    }

    pub fn image_pull(&self, defaults: &ServiceDefaults) -> bool {
        resolve_image_pull(defaults, self.image_pull)
    }

    pub fn mounts(&self, defaults: &ServiceDefaults) -> Vec<MountConfig> {
        merge_mounts(&defaults.mounts, &self.mounts)
    }

    pub fn user(&self, defaults: &ServiceDefaults) -> Option<String> {
        resolve_user(defaults, &self.user)
    }

    pub fn host_network(&self, defaults: &ServiceDefaults) -> bool {
        resolve_host_network(defaults, &self.network)
    }
}

// =============================================================================
// Loading and validation
// =============================================================================

impl ServiceConfig {
    pub fn from_yaml(name: &str, yaml: &str) -> Result<Self> {
        let mut config: ServiceConfig = serde_yaml::from_str(yaml)?;
        config.name = name.to_string();
        config.validate()?;
        Ok(config)
    }

    /// Load `<config_dir>/<name>.yaml`.
    pub fn load(config_dir: &Path, name: &str) -> Result<Self> {
        let path = config_dir.join(format!("{}.yaml", name));
        let yaml = std::fs::read_to_string(&path)?;
        Self::from_yaml(name, &yaml)
    }

    fn validate(&self) -> Result<()> {
        self.validate_callbacks()?;

        for (name, process) in &self.processes {
            if !process.image.is_empty() && process.image_tag.is_empty() {
                return Err(Error::Configuration(format!(
                    "process ({}): imageTag must be specified when image specified",
                    name
                )));
            }
        }
        for (name, task) in &self.tasks {
            if !task.image.is_empty() && task.image_tag.is_empty() {
                return Err(Error::Configuration(format!(
                    "task ({}): imageTag must be specified when image specified",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Every callback must name an existing, non-interactive task.
    fn validate_callbacks(&self) -> Result<()> {
        let sets = [
            &self.callbacks.pre_deployment,
            &self.callbacks.post_deployment,
        ];
        for set in sets {
            for task_name in set {
                let task = self.tasks.get(task_name).ok_or_else(|| {
                    Error::Configuration(format!(
                        "task ({}) specified in callback not found",
                        task_name
                    ))
                })?;

                if task.interactive {
                    return Err(Error::Configuration(format!(
                        "interactive tasks may not be callbacks ({})",
                        task_name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Find the sole service in a config directory.
///
/// Exactly one `*.yaml` file must exist for a default to be inferable.
pub fn find_default_service(config_dir: &Path) -> Result<String> {
    let mut service_name: Option<String> = None;
    for entry in std::fs::read_dir(config_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(stem) = file_name.strip_suffix(".yaml") else {
            continue;
        };

        if service_name.is_some() {
            return Err(Error::MultipleServices);
        }
        service_name = Some(stem.to_string());
    }

    service_name.ok_or(Error::NoService)
}
