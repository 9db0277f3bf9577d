// ABOUTME: The deployment controller.
// ABOUTME: Rolls a service forward one generation, process by process.

use super::{
    DEPLOYMENT_LABEL, Engine, MANAGED_LABEL, PORT_LABEL, PROCESS_LABEL, SERVICE_LABEL,
    container_full_name,
};
use crate::caddy::AdminApi;
use crate::error::{Error, Result};
use crate::runtime::{
    ContainerConfig, ContainerFilters, GuvnorRuntime, Mount, MountKind, PortMapping,
    RestartPolicyConfig,
};
use crate::service::{DeploymentStrategy, ProcessConfig, ServiceConfig, merge_env};
use crate::state::{DeploymentStatus, StateStore};
use crate::types::ContainerId;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, error, info};

/// Stop timeout applied when the replace strategy retires a replica before
/// its successor exists.
const REPLACE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct DeployArgs {
    /// Service to deploy; None resolves the default service.
    pub service_name: Option<String>,
    /// Image tag override applied to every process in this deployment.
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeployResult {
    pub service_name: String,
    pub deployment_id: u64,
}

/// A placed replica, tracked by its load-balancer upstream port.
#[derive(Debug, Clone)]
struct ProcessContainer {
    id: ContainerId,
    name: String,
    port: u16,
}

impl<R, A, S> Engine<R, A, S>
where
    R: GuvnorRuntime,
    A: AdminApi,
    S: StateStore,
{
    /// Advance a service to a new generation of containers.
    pub async fn deploy(&self, args: DeployArgs) -> Result<DeployResult> {
        let svc = self.load_service_config(args.service_name.as_deref().unwrap_or(""))?;

        let mut state = self.state.load(&svc.name)?;
        state.deployment_id += 1;
        state.last_deployed_at = Some(Utc::now());
        state.deployment_status = Some(DeploymentStatus::Failure);
        let deployment_id = state.deployment_id;

        // Persist the claimed generation before any side-effecting work so a
        // crash mid-deployment still leaves a failure record behind.
        self.state.save(&svc.name, &state)?;

        info!(service = %svc.name, deployment = deployment_id, "starting deployment");
        let result = self
            .run_deployment(&svc, deployment_id, args.tag.as_deref())
            .await;
        if result.is_ok() {
            state.deployment_status = Some(DeploymentStatus::Success);
        }

        // The record is written on every exit path; the deployment's own
        // error wins over a failed save.
        if let Err(save_error) = self.state.save(&svc.name, &state) {
            error!(service = %svc.name, error = %save_error, "failed to save service state");
        }

        result.map(|()| DeployResult {
            service_name: svc.name.clone(),
            deployment_id,
        })
    }

    async fn run_deployment(
        &self,
        svc: &ServiceConfig,
        deployment_id: u64,
        tag: Option<&str>,
    ) -> Result<()> {
        self.run_callbacks(
            svc,
            &svc.callbacks.pre_deployment,
            deployment_id,
            "PRE_DEPLOYMENT",
        )
        .await?;

        self.caddy.init(&self.docker).await?;

        for (process_name, process) in &svc.processes {
            self.deploy_service_process(svc, process_name, process, deployment_id, tag)
                .await?;
        }

        self.run_callbacks(
            svc,
            &svc.callbacks.post_deployment,
            deployment_id,
            "POST_DEPLOYMENT",
        )
        .await?;

        Ok(())
    }

    async fn run_callbacks(
        &self,
        svc: &ServiceConfig,
        task_names: &[String],
        deployment_id: u64,
        callback: &str,
    ) -> Result<()> {
        for task_name in task_names {
            let task = svc
                .tasks
                .get(task_name)
                .ok_or_else(|| Error::TaskNotFound(task_name.clone()))?;

            info!(task = %task_name, callback, "running callback task");
            let inject_env = HashMap::from([
                ("GUVNOR_DEPLOYMENT".to_string(), deployment_id.to_string()),
                ("GUVNOR_CALLBACK".to_string(), callback.to_string()),
            ]);
            self.execute_task(svc, task_name, task, inject_env).await?;
        }

        Ok(())
    }

    async fn deploy_service_process(
        &self,
        svc: &ServiceConfig,
        process_name: &str,
        process: &ProcessConfig,
        deployment_id: u64,
        tag: Option<&str>,
    ) -> Result<()> {
        info!(service = %svc.name, process = %process_name, "deploying process");

        let mut old = self
            .previous_generation(svc, process_name, deployment_id)
            .await?;

        let image = process.image(&svc.defaults, tag)?;
        if process.image_pull(&svc.defaults) {
            self.pull_image(&image).await?;
        }

        let has_backend = !process.caddy.hostnames.is_empty();
        let mut new: Vec<ProcessContainer> = Vec::new();

        for index in 0..process.quantity() {
            match process.strategy() {
                DeploymentStrategy::Default => {
                    let started = self
                        .start_process_container(
                            svc,
                            process_name,
                            process,
                            deployment_id,
                            index,
                            &image,
                        )
                        .await?;

                    if let Some(check) = &process.ready_check {
                        check.wait(&format!("localhost:{}", started.port)).await?;
                    }

                    let victim = old.pop_front();
                    new.push(started);

                    if has_backend {
                        self.reconcile_backend(svc, process_name, process, &old, &new)
                            .await?;
                    }

                    if let Some(victim) = victim {
                        debug!(container = %victim.name, "signalling old replica to terminate");
                        self.docker.kill_container(&victim.id, "SIGTERM").await?;
                    }
                }
                DeploymentStrategy::Replace => {
                    if let Some(victim) = old.pop_front() {
                        if has_backend {
                            self.reconcile_backend(svc, process_name, process, &old, &new)
                                .await?;
                        }
                        debug!(container = %victim.name, "stopping old replica");
                        self.docker
                            .stop_container(&victim.id, REPLACE_STOP_TIMEOUT)
                            .await?;
                    }

                    let started = self
                        .start_process_container(
                            svc,
                            process_name,
                            process,
                            deployment_id,
                            index,
                            &image,
                        )
                        .await?;

                    if let Some(check) = &process.ready_check {
                        check.wait(&format!("localhost:{}", started.port)).await?;
                    }

                    new.push(started);
                    if has_backend {
                        self.reconcile_backend(svc, process_name, process, &old, &new)
                            .await?;
                    }
                }
            }
        }

        // Drop any upstreams belonging to replica slots that no longer
        // exist because the quantity shrank.
        if has_backend {
            self.reconcile_backend(svc, process_name, process, &VecDeque::new(), &new)
                .await?;
        }

        // Surplus old replicas are told to terminate; Cleanup sweeps the
        // stopped containers later.
        for leftover in old {
            debug!(container = %leftover.name, "signalling surplus replica to terminate");
            self.docker.kill_container(&leftover.id, "SIGTERM").await?;
        }

        Ok(())
    }

    async fn reconcile_backend(
        &self,
        svc: &ServiceConfig,
        process_name: &str,
        process: &ProcessConfig,
        old: &VecDeque<ProcessContainer>,
        new: &[ProcessContainer],
    ) -> Result<()> {
        let backend = format!("{}-{}", svc.name, process_name);
        let upstreams: Vec<String> = old
            .iter()
            .chain(new.iter())
            .map(|c| format!("localhost:{}", c.port))
            .collect();

        self.caddy
            .configure_backend(
                &backend,
                &process.caddy.hostnames,
                &upstreams,
                &process.caddy.path,
            )
            .await?;
        Ok(())
    }

    /// List the previous generation's containers for a process, ordered by
    /// name, with each container's upstream port read from its label.
    async fn previous_generation(
        &self,
        svc: &ServiceConfig,
        process_name: &str,
        deployment_id: u64,
    ) -> Result<VecDeque<ProcessContainer>> {
        let filters = ContainerFilters {
            all: true,
            labels: vec![
                format!("{}={}", SERVICE_LABEL, svc.name),
                format!("{}={}", PROCESS_LABEL, process_name),
                format!("{}={}", DEPLOYMENT_LABEL, deployment_id.saturating_sub(1)),
            ],
            ..Default::default()
        };

        let mut containers = self.docker.list_containers(&filters).await?;
        containers.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = VecDeque::with_capacity(containers.len());
        for container in containers {
            let port = container
                .labels
                .get(PORT_LABEL)
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "container {} is missing its port label",
                        container.name
                    ))
                })?;

            out.push_back(ProcessContainer {
                id: container.id,
                name: container.name,
                port,
            });
        }

        Ok(out)
    }

    async fn start_process_container(
        &self,
        svc: &ServiceConfig,
        process_name: &str,
        process: &ProcessConfig,
        deployment_id: u64,
        index: u32,
        image: &str,
    ) -> Result<ProcessContainer> {
        let name = container_full_name(&svc.name, deployment_id, process_name, index);
        let port = free_port()?;

        let engine_env = HashMap::from([
            ("PORT".to_string(), port.to_string()),
            ("GUVNOR_SERVICE".to_string(), svc.name.clone()),
            ("GUVNOR_PROCESS".to_string(), process_name.to_string()),
            ("GUVNOR_DEPLOYMENT".to_string(), deployment_id.to_string()),
        ]);
        let env = merge_env(&[&svc.defaults.env, &process.env, &engine_env]);

        let mounts = process
            .mounts(&svc.defaults)
            .into_iter()
            .map(|m| Mount {
                source: m.host,
                target: m.container,
                kind: MountKind::Bind,
            })
            .collect();

        let labels = HashMap::from([
            (MANAGED_LABEL.to_string(), "1".to_string()),
            (SERVICE_LABEL.to_string(), svc.name.clone()),
            (PROCESS_LABEL.to_string(), process_name.to_string()),
            (DEPLOYMENT_LABEL.to_string(), deployment_id.to_string()),
            (PORT_LABEL.to_string(), port.to_string()),
        ]);

        let mut config = ContainerConfig {
            name: name.clone(),
            image: image.to_string(),
            command: if process.command.is_empty() {
                None
            } else {
                Some(process.command.clone())
            },
            env,
            labels,
            mounts,
            user: process.user(&svc.defaults),
            privileged: process.privileged,
            restart_policy: RestartPolicyConfig::Always,
            stop_timeout: Some(process.shutdown_grace_period),
            ..Default::default()
        };

        if process.host_network(&svc.defaults) {
            config.network_mode = Some("host".to_string());
        } else {
            config.ports = vec![PortMapping {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: port,
                container_port: port,
            }];
            // host-gateway tells the engine to insert the IP of the host's
            // gateway on the container network.
            config.extra_hosts = vec!["host.docker.internal:host-gateway".to_string()];
        }

        debug!(container = %name, port, "starting process container");
        let id = self.docker.create_container(&config).await?;
        self.docker.start_container(&id).await?;
        self.docker.inspect_container(&id).await?;

        Ok(ProcessContainer { id, name, port })
    }
}

/// Pick a free host port by binding an ephemeral listener and releasing it.
/// The port can be claimed by another binder between release and container
/// start; that race is accepted on a single-tenant host.
fn free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
