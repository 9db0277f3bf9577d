// ABOUTME: Reports the observed state of a service's containers.
// ABOUTME: Buckets containers by process label against the wanted replicas.

use super::{Engine, PROCESS_LABEL, SERVICE_LABEL};
use crate::caddy::AdminApi;
use crate::error::Result;
use crate::runtime::{ContainerFilters, GuvnorRuntime};
use crate::state::{DeploymentStatus, StateStore};
use crate::types::ContainerId;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct StatusArgs {
    /// Service to inspect; None resolves the default service.
    pub service_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusResult {
    pub deployment_id: u64,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub deployment_status: Option<DeploymentStatus>,
    /// Per-process status, keyed by process name in sorted order.
    pub processes: BTreeMap<String, ProcessStatus>,
}

#[derive(Debug, Clone)]
pub struct ProcessStatus {
    pub want_replicas: u32,
    pub containers: Vec<ContainerStatus>,
}

#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub name: String,
    pub id: ContainerId,
    pub state: String,
}

impl<R, A, S> Engine<R, A, S>
where
    R: GuvnorRuntime,
    A: AdminApi,
    S: StateStore,
{
    /// Report the persisted deployment record and the containers observed
    /// for each of the service's processes.
    pub async fn status(&self, args: StatusArgs) -> Result<StatusResult> {
        let svc = self.load_service_config(args.service_name.as_deref().unwrap_or(""))?;
        let state = self.state.load(&svc.name)?;

        debug!(service = %svc.name, "fetching container list for service");
        let containers = self
            .docker
            .list_containers(&ContainerFilters {
                all: true,
                labels: vec![format!("{}={}", SERVICE_LABEL, svc.name)],
                ..Default::default()
            })
            .await?;

        let mut processes = BTreeMap::new();
        for (process_name, process) in &svc.processes {
            let mut process_status = ProcessStatus {
                want_replicas: process.quantity(),
                containers: Vec::new(),
            };

            for container in &containers {
                let belongs = container
                    .labels
                    .get(PROCESS_LABEL)
                    .is_some_and(|p| p == process_name);
                if belongs {
                    process_status.containers.push(ContainerStatus {
                        name: container.name.clone(),
                        id: container.id.clone(),
                        state: container.state.clone(),
                    });
                }
            }

            processes.insert(process_name.clone(), process_status);
        }

        Ok(StatusResult {
            deployment_id: state.deployment_id,
            last_deployed_at: state.last_deployed_at,
            deployment_status: state.deployment_status,
            processes,
        })
    }
}
