// ABOUTME: Container engine abstraction for guvnor.
// ABOUTME: Capability traits plus the production bollard implementation.

mod bollard;
mod traits;

pub use bollard::BollardRuntime;
pub use traits::{
    AttachError, AttachOps, AttachStreams, ContainerConfig, ContainerError, ContainerFilters,
    ContainerInfo, ContainerOps, ContainerSummary, GuvnorRuntime, ImageError, ImageOps, Mount,
    MountKind, OutputChunk, PortMapping, RegistryAuth, RestartPolicyConfig,
};
