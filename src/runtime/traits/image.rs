// ABOUTME: Image operations trait for the container engine.
// ABOUTME: Pulling images with optional registry authentication.

use super::shared_types::RegistryAuth;
use async_trait::async_trait;

/// Image operations.
#[async_trait]
pub trait ImageOps: Send + Sync {
    /// Pull an image, making it available in the local store.
    async fn pull_image(
        &self,
        image: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to pull image: {0}")]
    PullFailed(String),

    #[error("image not found: {0}")]
    NotFound(String),

    #[error("engine error: {0}")]
    Runtime(String),
}
