// ABOUTME: Composable capability traits for the container engine.
// ABOUTME: Defines ImageOps, ContainerOps, and AttachOps.

mod attach;
mod container;
mod image;
mod shared_types;

pub use attach::{AttachError, AttachOps, AttachStreams, OutputChunk};
pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use image::{ImageError, ImageOps};
pub use shared_types::*;

/// Full engine capability - convenience trait combining all sub-traits.
///
/// Auto-implemented for any type that implements all the required traits.
pub trait GuvnorRuntime: ImageOps + ContainerOps + AttachOps {}

impl<T> GuvnorRuntime for T where T: ImageOps + ContainerOps + AttachOps {}
