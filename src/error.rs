// ABOUTME: Application-wide error types for guvnor.
// ABOUTME: Uses thiserror and aggregates the per-module error enums.

use crate::caddy::CaddyError;
use crate::ready::ReadyError;
use crate::runtime::{AttachError, ContainerError, ImageError};
use crate::state::StateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("no service found")]
    NoService,

    #[error("multiple services found, no default")]
    MultipleServices,

    #[error("task '{0}' cannot be found in config")]
    TaskNotFound(String),

    #[error("terminal error: {0}")]
    Terminal(String),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Caddy(#[from] CaddyError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Ready(#[from] ReadyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
