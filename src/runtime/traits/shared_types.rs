// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: ContainerConfig, ContainerInfo, RegistryAuth, mounts, and ports.

use crate::types::ContainerId;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for creating a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    /// Name for the container.
    pub name: String,
    /// Image reference, including the tag.
    pub image: String,
    /// Command to run (overrides image CMD).
    pub command: Option<Vec<String>>,
    /// Entrypoint (overrides image ENTRYPOINT).
    pub entrypoint: Option<Vec<String>>,
    /// Environment variables.
    pub env: HashMap<String, String>,
    /// Labels to apply.
    pub labels: HashMap<String, String>,
    /// Filesystem mounts.
    pub mounts: Vec<Mount>,
    /// Host to container port mappings.
    pub ports: Vec<PortMapping>,
    /// Extra /etc/hosts entries ("host:ip" or "host:host-gateway").
    pub extra_hosts: Vec<String>,
    /// Network mode ("host"), or None for the default bridge.
    pub network_mode: Option<String>,
    /// User to run as.
    pub user: Option<String>,
    /// Grant all capabilities.
    pub privileged: bool,
    /// Allocate a TTY.
    pub tty: bool,
    /// Keep stdin open.
    pub open_stdin: bool,
    /// Restart policy.
    pub restart_policy: RestartPolicyConfig,
    /// Timeout applied when the engine stops this container.
    pub stop_timeout: Option<Duration>,
}

/// A filesystem mount into a container.
#[derive(Debug, Clone)]
pub struct Mount {
    /// Host path or volume name.
    pub source: String,
    /// Target path in the container.
    pub target: String,
    /// Bind mount or named volume.
    pub kind: MountKind,
}

/// Mount flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Bind,
    Volume,
}

/// Port mapping configuration.
#[derive(Debug, Clone)]
pub struct PortMapping {
    /// Host IP to bind to (None = all interfaces).
    pub host_ip: Option<String>,
    /// Host port.
    pub host_port: u16,
    /// Container port.
    pub container_port: u16,
}

/// Restart policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicyConfig {
    /// Never restart.
    #[default]
    No,
    /// Always restart.
    Always,
}

/// Information about a container, from inspect.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Container ID.
    pub id: ContainerId,
    /// Container name.
    pub name: String,
    /// Current state string ("running", "exited", ...).
    pub state: String,
    /// Whether the container is currently running.
    pub running: bool,
    /// Labels.
    pub labels: HashMap<String, String>,
}

/// Registry authentication credentials.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
    /// Registry server the credentials belong to.
    pub server: Option<String>,
}
