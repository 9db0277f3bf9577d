// ABOUTME: The guvnor engine facade.
// ABOUTME: Binds runtime, caddy manager, and state store behind one API.

mod cleanup;
mod deploy;
mod status;
mod task;
mod tty;

pub use cleanup::CleanupArgs;
pub use deploy::{DeployArgs, DeployResult};
pub use status::{ContainerStatus, ProcessStatus, StatusArgs, StatusResult};
pub use task::RunTaskArgs;

use crate::auth;
use crate::caddy::{AdminApi, Manager};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::runtime::GuvnorRuntime;
use crate::service::{self, ServiceConfig};
use crate::state::StateStore;
use std::collections::HashMap;
use tracing::{debug, info};

pub const MANAGED_LABEL: &str = "io.k.guvnor.managed";
pub const SERVICE_LABEL: &str = "io.k.guvnor.service";
pub const PROCESS_LABEL: &str = "io.k.guvnor.process";
pub const DEPLOYMENT_LABEL: &str = "io.k.guvnor.deployment";
pub const PORT_LABEL: &str = "io.k.guvnor.port";
pub const TASK_LABEL: &str = "io.k.guvnor.task";

/// The deployment engine.
///
/// Generic over the container runtime, the caddy admin API, and the state
/// store so the orchestration logic can be exercised without a running
/// engine or proxy. Methods are not safe to call concurrently for the same
/// service; callers serialize at the admin layer.
pub struct Engine<R, A, S> {
    config: EngineConfig,
    docker: R,
    caddy: Manager<A>,
    state: S,
}

impl<R, A, S> Engine<R, A, S>
where
    R: GuvnorRuntime,
    A: AdminApi,
    S: StateStore,
{
    pub fn new(config: EngineConfig, docker: R, admin: A, state: S) -> Self {
        let container_labels =
            HashMap::from([(MANAGED_LABEL.to_string(), "1".to_string())]);
        let caddy = Manager::new(config.caddy.clone(), admin, container_labels);

        Self {
            config,
            docker,
            caddy,
            state,
        }
    }

    /// Work out which service to operate on when none was named.
    pub fn get_default_service(&self) -> Result<String> {
        service::find_default_service(&self.config.paths.config)
    }

    pub(crate) fn load_service_config(&self, service_name: &str) -> Result<ServiceConfig> {
        let name = if service_name.is_empty() {
            let default = self.get_default_service()?;
            debug!(default = %default, "no service specified, defaulting");
            default
        } else {
            service_name.to_string()
        };

        ServiceConfig::load(&self.config.paths.config, &name)
    }

    /// Ensure an image is present in the local store, authenticating with
    /// the user's registry credentials when available.
    pub(crate) async fn pull_image(&self, image: &str) -> Result<()> {
        let registry_auth = match auth::auth_for_image(image) {
            Ok(found) => Some(found),
            Err(reason) => {
                info!(%reason, "could not load docker credentials, using no auth");
                None
            }
        };

        info!(image, "pulling image");
        self.docker.pull_image(image, registry_auth.as_ref()).await?;
        Ok(())
    }
}

/// Name of a process replica container.
pub(crate) fn container_full_name(
    service: &str,
    deployment_id: u64,
    process: &str,
    index: u32,
) -> String {
    format!("{}-{}-{}-{}", service, process, deployment_id, index)
}
