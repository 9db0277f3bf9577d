// ABOUTME: Manages the guvnor-owned Caddy instance.
// ABOUTME: Container bootstrap, baseline config reconciliation, backend routes.

mod client;
mod types;

pub use client::{AdminApi, AdminClient, CaddyError};
pub use types::{AdminConfig, Handler, HttpApp, KnownHandler, MatcherSet, Route, Server, Upstream};

use crate::error::{Error, Result};
use crate::runtime::{
    ContainerConfig, ContainerFilters, ContainerOps, ImageOps, Mount, MountKind,
    RestartPolicyConfig,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

const CADDY_CONTAINER_NAME: &str = "guvnor-caddy";
pub(crate) const SERVER_NAME: &str = "guvnor";

const DATA_VOLUME: &str = "guvnor-caddy-data";
const CONFIG_VOLUME: &str = "guvnor-caddy-config";

const READY_ATTEMPTS: u32 = 20;
const READY_INTERVAL: Duration = Duration::from_millis(500);

const FALLBACK_BODY: &str = "Welcome to Guvnor. We found no backend matching your request.";

/// Reverse-proxy configuration from the engine config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Container image to deploy as caddy.
    #[serde(default = "default_image")]
    pub image: String,

    /// IP to listen on; empty means all interfaces.
    #[serde(rename = "listenIP", default)]
    pub listen_ip: String,

    #[serde(default)]
    pub acme: AcmeConfig,

    #[serde(default)]
    pub ports: PortsConfig,

    /// Extra backends to route that guvnor does not deploy itself.
    #[serde(default)]
    pub additional_backends: BTreeMap<String, AdditionalBackend>,
}

fn default_image() -> String {
    "caddy:2-alpine".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image: default_image(),
            listen_ip: String::new(),
            acme: AcmeConfig::default(),
            ports: PortsConfig::default(),
            additional_backends: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcmeConfig {
    /// URL of the ACME service.
    #[serde(default)]
    pub ca: String,
    /// Contact address to provide to the ACME service.
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortsConfig {
    #[serde(default = "default_http_port")]
    pub http: u16,
    #[serde(default = "default_https_port")]
    pub https: u16,
}

fn default_http_port() -> u16 {
    80
}

fn default_https_port() -> u16 {
    443
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            http: default_http_port(),
            https: default_https_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalBackend {
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub upstreams: Vec<String>,
}

/// Ensures the caddy container runs and keeps its configuration reconciled.
pub struct Manager<A> {
    admin: A,
    config: Config,
    container_labels: HashMap<String, String>,
}

impl<A: AdminApi> Manager<A> {
    pub fn new(config: Config, admin: A, container_labels: HashMap<String, String>) -> Self {
        Self {
            admin,
            config,
            container_labels,
        }
    }

    /// Ensure a caddy container is running and configured to accept config
    /// at the expected path. Idempotent.
    pub async fn init<R>(&self, runtime: &R) -> Result<()>
    where
        R: ImageOps + ContainerOps,
    {
        debug!("initializing caddy");
        let existing = runtime
            .list_containers(&ContainerFilters {
                name: Some(CADDY_CONTAINER_NAME.to_string()),
                all: true,
                ..Default::default()
            })
            .await?;

        if existing.len() > 1 {
            return Err(Error::Caddy(CaddyError::MultipleContainers));
        }

        // If there's exactly one caddy container, there's nothing to boot.
        if existing.len() == 1 {
            debug!("caddy container already running");
            return Ok(self.reconcile_config().await?);
        }

        debug!("no caddy container detected, creating one");
        // This will not fetch unless the image is absent from the local cache.
        runtime.pull_image(&self.config.image, None).await?;

        let container = ContainerConfig {
            name: CADDY_CONTAINER_NAME.to_string(),
            image: self.config.image.clone(),
            entrypoint: Some(vec!["caddy".to_string()]),
            command: Some(vec!["run".to_string(), "--resume".to_string()]),
            labels: self.container_labels.clone(),
            mounts: vec![
                Mount {
                    source: DATA_VOLUME.to_string(),
                    target: "/data".to_string(),
                    kind: MountKind::Volume,
                },
                Mount {
                    source: CONFIG_VOLUME.to_string(),
                    target: "/config".to_string(),
                    kind: MountKind::Volume,
                },
            ],
            network_mode: Some("host".to_string()),
            restart_policy: RestartPolicyConfig::Always,
            ..Default::default()
        };

        let id = runtime.create_container(&container).await?;
        debug!(
            image = %self.config.image,
            container_id = %id,
            "created caddy container, starting"
        );

        runtime.start_container(&id).await?;
        debug!("started caddy container");

        self.wait_ready().await?;
        Ok(self.reconcile_config().await?)
    }

    /// Poll the admin endpoint until it answers.
    async fn wait_ready(&self) -> std::result::Result<(), CaddyError> {
        for attempt in 1..=READY_ATTEMPTS {
            match self.admin.get_config().await {
                Ok(_) => {
                    debug!(attempt, "caddy admin ready");
                    return Ok(());
                }
                Err(error) => {
                    debug!(attempt, max_attempts = READY_ATTEMPTS, %error, "caddy admin not ready");
                }
            }
            tokio::time::sleep(READY_INTERVAL).await;
        }

        Err(CaddyError::NotReady)
    }

    /// Bring the admin configuration to the desired baseline shape, writing
    /// it back only when something actually changed.
    pub(crate) async fn reconcile_config(&self) -> std::result::Result<(), CaddyError> {
        let mut config = self.admin.get_config().await?;
        let mut changed = false;

        let mut http: HttpApp = match config.apps.get("http") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => HttpApp::default(),
        };

        if http.http_port != Some(self.config.ports.http) {
            http.http_port = Some(self.config.ports.http);
            changed = true;
        }

        if http.https_port != Some(self.config.ports.https) {
            http.https_port = Some(self.config.ports.https);
            changed = true;
        }

        if !http.servers.contains_key(SERVER_NAME) {
            changed = true;
        }
        let server = http.servers.entry(SERVER_NAME.to_string()).or_default();

        let listen_addr = format!("{}:{}", self.config.listen_ip, self.config.ports.https);
        if server.listen.len() != 1 || server.listen[0] != listen_addr {
            server.listen = vec![listen_addr];
            changed = true;
        }

        // Install the fallback route when the server has no routes at all.
        if server.routes.is_empty() {
            server.routes.push(Route {
                handlers: vec![Handler::static_response(FALLBACK_BODY, "404")],
                ..Default::default()
            });
            changed = true;
        }

        if changed {
            config
                .apps
                .insert("http".to_string(), serde_json::to_value(&http)?);
            self.admin.post_config(&config).await?;
        }

        for (name, backend) in &self.config.additional_backends {
            self.configure_backend(name, &backend.hostnames, &backend.upstreams, &backend.path)
                .await?;
        }

        Ok(())
    }

    /// Install or update the route for a backend, keeping the route list
    /// ordered by specificity. The whole list is written back in one PATCH.
    pub async fn configure_backend(
        &self,
        backend_name: &str,
        hostnames: &[String],
        upstreams: &[String],
        path: &str,
    ) -> std::result::Result<(), CaddyError> {
        info!(
            backend = backend_name,
            ?hostnames,
            path,
            ?upstreams,
            "configuring caddy for backend"
        );

        let mut routes = self.admin.get_routes().await?;
        let route = generate_route_for_backend(backend_name, hostnames, upstreams, path);

        let mut existing = false;
        for slot in routes.iter_mut() {
            if slot.group == backend_name {
                *slot = route.clone();
                existing = true;
            }
        }
        if !existing {
            routes.push(route);
        }

        sort_routes(&mut routes);

        self.admin.patch_routes(&routes).await
    }
}

fn generate_route_for_backend(
    backend_name: &str,
    hostnames: &[String],
    upstreams: &[String],
    path: &str,
) -> Route {
    let handler = Handler::reverse_proxy(
        upstreams
            .iter()
            .map(|u| Upstream { dial: u.clone() })
            .collect(),
    );

    let mut matcher = MatcherSet {
        host: hostnames.to_vec(),
        path: Vec::new(),
    };
    if !path.is_empty() {
        matcher.path = vec![path.to_string()];
    }

    Route {
        group: backend_name.to_string(),
        matcher_sets: vec![matcher],
        handlers: vec![handler],
        terminal: true,
    }
}

/// Specificity key: routes without matcher sets sort last, routes without a
/// path matcher next, then by descending path segment count.
fn path_specificity(route: &Route) -> i32 {
    let Some(matcher) = route.matcher_sets.first() else {
        return -1;
    };

    match matcher.path.first() {
        None => 0,
        Some(path) if path.is_empty() => 0,
        Some(path) => path.split('/').count() as i32,
    }
}

/// Stable sort by decreasing path specificity so the most specific routes
/// are matched first.
pub fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(|a, b| path_specificity(b).cmp(&path_specificity(a)));
}
