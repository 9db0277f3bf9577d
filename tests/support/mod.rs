// ABOUTME: Shared fakes for integration tests.
// ABOUTME: In-memory container runtime, admin API recorder, and a harness.

#![allow(dead_code)]

use async_trait::async_trait;
use guvnor::caddy::{AdminApi, AdminConfig, CaddyError, Route};
use guvnor::config::{EngineConfig, PathsConfig};
use guvnor::engine::Engine;
use guvnor::runtime::{
    AttachError, AttachOps, AttachStreams, ContainerConfig, ContainerError, ContainerFilters,
    ContainerInfo, ContainerOps, ContainerSummary, ImageError, ImageOps, RegistryAuth,
};
use guvnor::state::FileBasedStore;
use guvnor::types::ContainerId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// MockRuntime
// =============================================================================

/// A container held by the fake engine.
#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: ContainerId,
    pub name: String,
    pub config: ContainerConfig,
    pub running: bool,
}

#[derive(Default)]
struct RuntimeState {
    containers: Vec<FakeContainer>,
    removed: Vec<FakeContainer>,
    pulled: Vec<String>,
    killed: Vec<(String, String)>,
    stopped: Vec<String>,
    next_id: u64,
}

/// In-memory stand-in for the container engine.
///
/// Cheap to clone; all clones share state so tests can keep a handle while
/// the engine owns another.
#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<RuntimeState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-existing container (e.g. a running caddy).
    pub fn add_container(&self, name: &str, config: ContainerConfig, running: bool) -> ContainerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ContainerId::new(format!("ctr-{}", state.next_id));
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            config,
            running,
        });
        id
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().containers.clone()
    }

    pub fn removed(&self) -> Vec<FakeContainer> {
        self.state.lock().removed.clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().pulled.clone()
    }

    /// Kill calls as (container name, signal) pairs.
    pub fn killed(&self) -> Vec<(String, String)> {
        self.state.lock().killed.clone()
    }

    /// Names of containers that were stopped.
    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().stopped.clone()
    }

    pub fn container_named(&self, name: &str) -> Option<FakeContainer> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    fn matches(container: &FakeContainer, filters: &ContainerFilters) -> bool {
        if let Some(ref name) = filters.name {
            if !container.name.contains(name.as_str()) {
                return false;
            }
        }

        for label in &filters.labels {
            match label.split_once('=') {
                Some((key, value)) => {
                    if container.config.labels.get(key).map(String::as_str) != Some(value) {
                        return false;
                    }
                }
                None => {
                    if !container.config.labels.contains_key(label) {
                        return false;
                    }
                }
            }
        }

        if !filters.all && !container.running {
            return false;
        }

        true
    }
}

#[async_trait]
impl ImageOps for MockRuntime {
    async fn pull_image(
        &self,
        image: &str,
        _auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        self.state.lock().pulled.push(image.to_string());
        Ok(())
    }
}

#[async_trait]
impl ContainerOps for MockRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let mut state = self.state.lock();
        if state.containers.iter().any(|c| c.name == config.name) {
            return Err(ContainerError::AlreadyExists(config.name.clone()));
        }

        state.next_id += 1;
        let id = ContainerId::new(format!("ctr-{}", state.next_id));
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: config.name.clone(),
            config: config.clone(),
            running: false,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.running = true;
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.running = false;
        let name = container.name.clone();
        state.stopped.push(name);
        Ok(())
    }

    async fn kill_container(&self, id: &ContainerId, signal: &str) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.running = false;
        let name = container.name.clone();
        state.killed.push((name, signal.to_string()));
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let index = state
            .containers
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;

        if state.containers[index].running && !force {
            return Err(ContainerError::Runtime(
                "cannot remove a running container without force".to_string(),
            ));
        }

        let container = state.containers.remove(index);
        state.removed.push(container);
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let state = self.state.lock();
        let container = state
            .containers
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;

        Ok(ContainerInfo {
            id: container.id.clone(),
            name: container.name.clone(),
            state: if container.running {
                "running".to_string()
            } else {
                "exited".to_string()
            },
            running: container.running,
            labels: container.config.labels.clone(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|c| Self::matches(c, filters))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.config.image.clone(),
                state: if c.running {
                    "running".to_string()
                } else {
                    "exited".to_string()
                },
                status: String::new(),
                labels: c.config.labels.clone(),
            })
            .collect())
    }

    async fn wait_container(&self, _id: &ContainerId) -> Result<i64, ContainerError> {
        Ok(0)
    }
}

#[async_trait]
impl AttachOps for MockRuntime {
    async fn attach_container(&self, _id: &ContainerId) -> Result<AttachStreams, AttachError> {
        Err(AttachError::Unsupported(
            "fake runtime has no streams".to_string(),
        ))
    }

    async fn resize_tty(
        &self,
        _id: &ContainerId,
        _width: u16,
        _height: u16,
    ) -> Result<(), AttachError> {
        Ok(())
    }

    async fn container_logs(&self, _id: &ContainerId) -> Result<(Vec<u8>, Vec<u8>), AttachError> {
        Ok((Vec::new(), Vec::new()))
    }
}

// =============================================================================
// RecordingAdmin
// =============================================================================

#[derive(Default)]
struct AdminState {
    config: AdminConfig,
    routes: Vec<Route>,
    config_posts: u32,
    route_patches: u32,
}

/// Records admin API traffic instead of talking to a live caddy.
#[derive(Clone, Default)]
pub struct RecordingAdmin {
    state: Arc<Mutex<AdminState>>,
}

impl RecordingAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_routes(&self, routes: Vec<Route>) {
        self.state.lock().routes = routes;
    }

    pub fn routes(&self) -> Vec<Route> {
        self.state.lock().routes.clone()
    }

    pub fn config(&self) -> AdminConfig {
        self.state.lock().config.clone()
    }

    pub fn config_posts(&self) -> u32 {
        self.state.lock().config_posts
    }

    pub fn route_patches(&self) -> u32 {
        self.state.lock().route_patches
    }
}

#[async_trait]
impl AdminApi for RecordingAdmin {
    async fn get_config(&self) -> Result<AdminConfig, CaddyError> {
        Ok(self.state.lock().config.clone())
    }

    async fn post_config(&self, config: &AdminConfig) -> Result<(), CaddyError> {
        let mut state = self.state.lock();
        state.config = config.clone();
        state.config_posts += 1;
        Ok(())
    }

    async fn get_routes(&self) -> Result<Vec<Route>, CaddyError> {
        Ok(self.state.lock().routes.clone())
    }

    async fn patch_routes(&self, routes: &[Route]) -> Result<(), CaddyError> {
        let mut state = self.state.lock();
        state.routes = routes.to_vec();
        state.route_patches += 1;
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// An engine wired to fakes, plus handles to observe them.
pub struct Harness {
    pub engine: Engine<MockRuntime, RecordingAdmin, FileBasedStore>,
    pub runtime: MockRuntime,
    pub admin: RecordingAdmin,
    pub store: FileBasedStore,
    pub config_dir: TempDir,
    pub state_dir: TempDir,
}

impl Harness {
    /// Build a harness around a single service config file.
    pub fn with_service(name: &str, yaml: &str) -> Self {
        let config_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        std::fs::write(config_dir.path().join(format!("{}.yaml", name)), yaml).unwrap();

        let runtime = MockRuntime::new();
        let admin = RecordingAdmin::new();
        let store = FileBasedStore::new(state_dir.path());

        let config = EngineConfig {
            caddy: Default::default(),
            paths: PathsConfig {
                config: config_dir.path().to_path_buf(),
                state: state_dir.path().to_path_buf(),
            },
        };

        let engine = Engine::new(config, runtime.clone(), admin.clone(), store.clone());

        Self {
            engine,
            runtime,
            admin,
            store,
            config_dir,
            state_dir,
        }
    }

    /// Replace the service config file, as an operator editing it would.
    pub fn rewrite_service(&self, name: &str, yaml: &str) {
        std::fs::write(
            self.config_dir.path().join(format!("{}.yaml", name)),
            yaml,
        )
        .unwrap();
    }
}
