// ABOUTME: Retires containers left behind by previous generations.
// ABOUTME: Cleanup removes a service's zombies; purge removes everything.

use super::{DEPLOYMENT_LABEL, Engine, MANAGED_LABEL, PROCESS_LABEL, SERVICE_LABEL};
use crate::caddy::AdminApi;
use crate::error::Result;
use crate::runtime::{ContainerFilters, GuvnorRuntime};
use crate::state::StateStore;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct CleanupArgs {
    /// Service to clean up; None resolves the default service.
    pub service_name: Option<String>,
}

impl<R, A, S> Engine<R, A, S>
where
    R: GuvnorRuntime,
    A: AdminApi,
    S: StateStore,
{
    /// Remove process containers whose deployment label does not match the
    /// currently persisted generation. Task containers are untouched; they
    /// are retired when their run ends.
    pub async fn cleanup(&self, args: CleanupArgs) -> Result<()> {
        let svc = self.load_service_config(args.service_name.as_deref().unwrap_or(""))?;
        let state = self.state.load(&svc.name)?;

        debug!(service = %svc.name, "finding process containers for service");
        let containers = self
            .docker
            .list_containers(&ContainerFilters {
                all: true,
                labels: vec![
                    MANAGED_LABEL.to_string(),
                    format!("{}={}", SERVICE_LABEL, svc.name),
                    // Only containers affiliated with a process.
                    PROCESS_LABEL.to_string(),
                ],
                ..Default::default()
            })
            .await?;

        debug!(
            service = %svc.name,
            count = containers.len(),
            "found process containers for service"
        );

        let current = state.deployment_id.to_string();
        let mut delete_count = 0;
        for container in containers {
            let Some(deployment) = container.labels.get(DEPLOYMENT_LABEL) else {
                continue;
            };

            if *deployment != current {
                debug!(
                    service = %svc.name,
                    container = %container.id,
                    "zombie container found; removing"
                );
                self.docker.remove_container(&container.id, true).await?;
                delete_count += 1;
            }
        }

        debug!(service = %svc.name, count = delete_count, "deleted zombie containers");
        Ok(())
    }

    /// Remove every container guvnor manages, then drop all persisted
    /// service records. Used for reset; no service filter.
    pub async fn purge(&self) -> Result<()> {
        debug!("purging all containers owned by guvnor");
        let containers = self
            .docker
            .list_containers(&ContainerFilters {
                all: true,
                labels: vec![format!("{}=1", MANAGED_LABEL)],
                ..Default::default()
            })
            .await?;

        for container in containers {
            debug!(container = %container.id, "purging container");
            self.docker.remove_container(&container.id, true).await?;
        }

        self.state.purge()?;
        Ok(())
    }
}
