// ABOUTME: Bollard-based container engine implementation.
// ABOUTME: Targets any Docker-compatible API over the local socket.

use crate::runtime::traits::{
    AttachError, AttachOps, AttachStreams, ContainerConfig, ContainerError, ContainerFilters,
    ContainerInfo, ContainerOps, ContainerSummary, ImageError, ImageOps, MountKind, OutputChunk,
    RegistryAuth, RestartPolicyConfig,
};
use crate::types::ContainerId;
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::{
    ContainerCreateBody, HostConfig, Mount, MountTypeEnum, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    AttachContainerOptions, CreateContainerOptions, CreateImageOptions, InspectContainerOptions,
    KillContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    ResizeContainerTTYOptions, StopContainerOptions, WaitContainerOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_image_pull_error(e: bollard::errors::Error, image: &str) -> ImageError {
    ImageError::PullFailed(format!("{}: {}", image, e))
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::ImageNotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::AlreadyExists(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::AlreadyRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_stop_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::NotRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_attach_error(e: bollard::errors::Error) -> AttachError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => AttachError::NotFound(message.clone()),
        _ => AttachError::Runtime(e.to_string()),
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container engine client backed by bollard.
pub struct BollardRuntime {
    client: Docker,
}

impl BollardRuntime {
    /// Create a runtime from an existing bollard client.
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Connect to the local container engine, honouring DOCKER_HOST.
    pub fn connect() -> Result<Self, ContainerError> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(
        &self,
        image: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        let opts = CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        };

        let credentials = auth.map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server.clone(),
            ..Default::default()
        });

        // Pull returns a stream of progress updates - consume it
        let mut stream = self.client.create_image(Some(opts), None, credentials);
        while let Some(result) = stream.next().await {
            result.map_err(|e| map_image_pull_error(e, image))?;
        }

        Ok(())
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mut host_config = HostConfig {
            restart_policy: Some(RestartPolicy {
                name: Some(match config.restart_policy {
                    RestartPolicyConfig::No => RestartPolicyNameEnum::NO,
                    RestartPolicyConfig::Always => RestartPolicyNameEnum::ALWAYS,
                }),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let mounts: Vec<Mount> = config
            .mounts
            .iter()
            .map(|m| Mount {
                source: Some(m.source.clone()),
                target: Some(m.target.clone()),
                typ: Some(match m.kind {
                    MountKind::Bind => MountTypeEnum::BIND,
                    MountKind::Volume => MountTypeEnum::VOLUME,
                }),
                ..Default::default()
            })
            .collect();
        if !mounts.is_empty() {
            host_config.mounts = Some(mounts);
        }

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for port in &config.ports {
            let port_key = format!("{}/tcp", port.container_port);
            exposed_ports.insert(port_key.clone(), HashMap::new());
            port_bindings.insert(
                port_key,
                Some(vec![PortBinding {
                    host_ip: port.host_ip.clone(),
                    host_port: Some(port.host_port.to_string()),
                }]),
            );
        }
        if !port_bindings.is_empty() {
            host_config.port_bindings = Some(port_bindings);
        }

        if !config.extra_hosts.is_empty() {
            host_config.extra_hosts = Some(config.extra_hosts.clone());
        }

        if let Some(ref mode) = config.network_mode {
            host_config.network_mode = Some(mode.clone());
        }

        if config.privileged {
            host_config.privileged = Some(true);
        }

        let body = ContainerCreateBody {
            image: Some(config.image.clone()),
            env: if env.is_empty() { None } else { Some(env) },
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            cmd: config.command.clone(),
            entrypoint: config.entrypoint.clone(),
            user: config.user.clone(),
            tty: Some(config.tty),
            open_stdin: Some(config.open_stdin),
            stop_timeout: config.stop_timeout.map(|d| d.as_secs() as i64),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(config.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), body)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(map_container_start_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_stop_error)
    }

    async fn kill_container(&self, id: &ContainerId, signal: &str) -> Result<(), ContainerError> {
        let opts = KillContainerOptions {
            signal: signal.to_string(),
            ..Default::default()
        };

        self.client
            .kill_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)?;

        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let state = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| format!("{:?}", s).to_lowercase())
            .unwrap_or_default();
        let running = details
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        Ok(ContainerInfo {
            id: id.clone(),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            state,
            running,
            labels: details.config.and_then(|c| c.labels).unwrap_or_default(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();

        if let Some(ref name) = filters.name {
            filter_map.insert("name".to_string(), vec![name.clone()]);
        }

        if !filters.labels.is_empty() {
            filter_map.insert("label".to_string(), filters.labels.clone());
        }

        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let id = c.id.unwrap_or_default();
                let names = c.names.unwrap_or_default();
                let name = names
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();

                let state = c
                    .state
                    .map(|s| format!("{:?}", s).to_lowercase())
                    .unwrap_or_default();

                ContainerSummary {
                    id: ContainerId::new(id),
                    name,
                    image: c.image.unwrap_or_default(),
                    state,
                    status: c.status.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        // The engine's default wait condition is not-running.
        let mut stream = self
            .client
            .wait_container(id.as_str(), None::<WaitContainerOptions>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error variant
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(ContainerError::Runtime(e.to_string())),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl AttachOps for BollardRuntime {
    async fn attach_container(&self, id: &ContainerId) -> Result<AttachStreams, AttachError> {
        let opts = AttachContainerOptions {
            stream: true,
            stdin: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let results = self
            .client
            .attach_container(id.as_str(), Some(opts))
            .await
            .map_err(map_attach_error)?;

        let output = results.output.map(|item| {
            item.map(|chunk| match chunk {
                LogOutput::StdErr { message } => OutputChunk::Stderr(message.to_vec()),
                LogOutput::StdOut { message }
                | LogOutput::StdIn { message }
                | LogOutput::Console { message } => OutputChunk::Stdout(message.to_vec()),
            })
            .map_err(|e| AttachError::Stream(e.to_string()))
        });

        Ok(AttachStreams {
            output: Box::pin(output),
            input: results.input,
        })
    }

    async fn resize_tty(
        &self,
        id: &ContainerId,
        width: u16,
        height: u16,
    ) -> Result<(), AttachError> {
        let opts = ResizeContainerTTYOptions {
            w: i32::from(width),
            h: i32::from(height),
            ..Default::default()
        };

        self.client
            .resize_container_tty(id.as_str(), opts)
            .await
            .map_err(map_attach_error)
    }

    async fn container_logs(&self, id: &ContainerId) -> Result<(Vec<u8>, Vec<u8>), AttachError> {
        let opts = LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.client.logs(id.as_str(), Some(opts));

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(item) = stream.next().await {
            match item.map_err(|e| AttachError::Stream(e.to_string()))? {
                LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                LogOutput::StdOut { message }
                | LogOutput::StdIn { message }
                | LogOutput::Console { message } => stdout.extend_from_slice(&message),
            }
        }

        Ok((stdout, stderr))
    }
}
