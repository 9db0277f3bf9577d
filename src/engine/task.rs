// ABOUTME: One-shot task container execution.
// ABOUTME: Supports interactive sessions with TTY pass-through and resize.

use super::tty;
use super::{Engine, MANAGED_LABEL, SERVICE_LABEL, TASK_LABEL};
use crate::caddy::AdminApi;
use crate::error::{Error, Result};
use crate::runtime::{ContainerConfig, GuvnorRuntime, Mount, MountKind};
use crate::service::{ServiceConfig, TaskConfig, merge_env};
use crate::state::StateStore;
use crate::types::ContainerId;
use chrono::Utc;
use std::collections::HashMap;
use std::io::Write;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

#[derive(Debug, Clone, Default)]
pub struct RunTaskArgs {
    /// Service the task belongs to; None resolves the default service.
    pub service_name: Option<String>,
    /// Task to invoke.
    pub task_name: String,
}

impl<R, A, S> Engine<R, A, S>
where
    R: GuvnorRuntime,
    A: AdminApi,
    S: StateStore,
{
    /// Invoke a task defined by a service.
    pub async fn run_task(&self, args: RunTaskArgs) -> Result<()> {
        let svc = self.load_service_config(args.service_name.as_deref().unwrap_or(""))?;

        let task = svc
            .tasks
            .get(&args.task_name)
            .ok_or_else(|| Error::TaskNotFound(args.task_name.clone()))?;

        self.execute_task(&svc, &args.task_name, task, HashMap::new())
            .await
    }

    /// Run a task container to completion and remove it.
    ///
    /// `inject_env` carries engine-provided variables (deployment callbacks
    /// use this) and overrides the task's own environment.
    pub(crate) async fn execute_task(
        &self,
        svc: &ServiceConfig,
        task_name: &str,
        task: &TaskConfig,
        inject_env: HashMap<String, String>,
    ) -> Result<()> {
        let image = task.image(&svc.defaults)?;
        if task.image_pull(&svc.defaults) {
            self.pull_image(&image).await?;
        }

        let guvnor_env = HashMap::from([
            ("GUVNOR_TASK".to_string(), task_name.to_string()),
            ("GUVNOR_SERVICE".to_string(), svc.name.clone()),
        ]);
        let env = merge_env(&[&svc.defaults.env, &task.env, &inject_env, &guvnor_env]);

        let mounts = task
            .mounts(&svc.defaults)
            .into_iter()
            .map(|m| Mount {
                source: m.host,
                target: m.container,
                kind: MountKind::Bind,
            })
            .collect();

        let full_name = format!(
            "{}-task-{}-{}",
            svc.name,
            task_name,
            Utc::now().timestamp()
        );

        let labels = HashMap::from([
            (MANAGED_LABEL.to_string(), "1".to_string()),
            (SERVICE_LABEL.to_string(), svc.name.clone()),
            (TASK_LABEL.to_string(), task_name.to_string()),
        ]);

        let mut config = ContainerConfig {
            name: full_name.clone(),
            image,
            command: if task.command.is_empty() {
                None
            } else {
                Some(task.command.clone())
            },
            env,
            labels,
            mounts,
            user: task.user(&svc.defaults),
            tty: task.interactive,
            open_stdin: task.interactive,
            ..Default::default()
        };

        if task.host_network(&svc.defaults) {
            config.network_mode = Some("host".to_string());
        } else {
            // host-gateway tells the engine to insert the IP of the host's
            // gateway on the container network.
            config.extra_hosts = vec!["host.docker.internal:host-gateway".to_string()];
        }

        info!(task_run = %full_name, "creating container");
        let id = self.docker.create_container(&config).await?;

        let streaming = if task.interactive {
            Some(self.attach_interactive(&id).await?)
        } else {
            None
        };

        info!(task_run = %full_name, "starting task run container");
        self.docker.start_container(&id).await?;

        if task.interactive {
            self.wait_with_resize(&id).await?;
        } else {
            self.docker.wait_container(&id).await?;
        }

        if let Some(handle) = streaming {
            // Wait for the interactive streams to close up.
            let _ = handle.await;
        }

        if !task.interactive {
            info!(task_run = %full_name, "task run complete, fetching logs");
            let (stdout, stderr) = self.docker.container_logs(&id).await?;

            let mut out = std::io::stdout();
            out.write_all(&stdout)?;
            out.flush()?;
            let mut err = std::io::stderr();
            err.write_all(&stderr)?;
            err.flush()?;
        }

        info!(task_run = %full_name, "deleting task run container");
        self.docker.remove_container(&id, true).await?;
        Ok(())
    }

    /// Attach to the container and stream its stdio through the calling
    /// terminal in the background.
    async fn attach_interactive(
        &self,
        id: &ContainerId,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let streams = self.docker.attach_container(id).await?;

        Ok(tokio::spawn(async move {
            if let Err(stream_error) = tty::stream_interactive(streams).await {
                error!(error = %stream_error, "failed in streaming interactive session");
            }
        }))
    }

    /// Await container exit while keeping its TTY sized to the calling
    /// terminal. The resize watcher cannot outlive the wait.
    async fn wait_with_resize(&self, id: &ContainerId) -> Result<()> {
        if let Err(resize_error) = self.resize_to_terminal(id).await {
            error!(error = %resize_error, "failed to update tty size");
        }

        let mut winch = signal(SignalKind::window_change())?;
        let wait = self.docker.wait_container(id);
        tokio::pin!(wait);

        loop {
            tokio::select! {
                result = &mut wait => {
                    result?;
                    return Ok(());
                }
                _ = winch.recv() => {
                    if let Err(resize_error) = self.resize_to_terminal(id).await {
                        error!(error = %resize_error, "failed to update tty size");
                    }
                }
            }
        }
    }

    async fn resize_to_terminal(&self, id: &ContainerId) -> Result<()> {
        let (width, height) =
            tty::terminal_size().map_err(|e| Error::Terminal(e.to_string()))?;
        self.docker.resize_tty(id, width, height).await?;
        Ok(())
    }
}
