// ABOUTME: Attach operations trait for the container engine.
// ABOUTME: Interactive stream attachment, TTY resize, and demuxed log fetch.

use crate::types::ContainerId;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tokio::io::AsyncWrite;

/// Attach and log operations.
#[async_trait]
pub trait AttachOps: Send + Sync {
    /// Attach to a container's stdio streams.
    async fn attach_container(&self, id: &ContainerId) -> Result<AttachStreams, AttachError>;

    /// Resize the container's TTY.
    async fn resize_tty(
        &self,
        id: &ContainerId,
        width: u16,
        height: u16,
    ) -> Result<(), AttachError>;

    /// Fetch the container's accumulated output, demuxed into stdout and
    /// stderr.
    async fn container_logs(&self, id: &ContainerId) -> Result<(Vec<u8>, Vec<u8>), AttachError>;
}

/// The two halves of an attached container session.
pub struct AttachStreams {
    /// Container output, demuxed per chunk.
    pub output: Pin<Box<dyn Stream<Item = Result<OutputChunk, AttachError>> + Send>>,
    /// Writer connected to the container's stdin.
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

/// A chunk of container output.
#[derive(Debug, Clone)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

impl OutputChunk {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            OutputChunk::Stdout(bytes) | OutputChunk::Stderr(bytes) => bytes,
        }
    }
}

/// Errors from attach operations.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("attach not supported: {0}")]
    Unsupported(String),

    #[error("engine error: {0}")]
    Runtime(String),
}
