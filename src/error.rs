use std::path::PathBuf;
use thiserror::Error;

use crate::model::ZoneId;

/// Errors raised while loading or validating [`crate::config::PublisherConfig`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("BIND base directory is not configured")]
    BaseDirUnset,

    #[error("BIND base directory does not exist: {0}")]
    BaseDirMissing(PathBuf),

    #[error("BIND base directory is not writable: {0}")]
    BaseDirNotWritable(PathBuf),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid worker count: {0}")]
    InvalidWorkers(String),

    #[error("Invalid excerpt size: {0}")]
    InvalidExcerpt(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[derive(Error, Debug, Clone)]
pub enum ZoneError {
    #[error("Zone not found: {0}")]
    NotFound(ZoneId),

    #[error("Attaching include {include} under {parent} would create a cycle")]
    Cycle { parent: ZoneId, include: ZoneId },

    #[error("Invalid include edge: {0}")]
    InvalidEdge(String),

    #[error("Zone generation failed: {0}")]
    Generation(String),

    #[error("Invalid zone path: {0}")]
    InvalidPath(String),

    /// The checker could not render a verdict (missing binary, crash, timeout).
    #[error("External checker error: {0}")]
    ExternalTool(String),

    /// The checker ran and rejected the zone.
    #[error("Zone validation failed: {0}")]
    ValidationFailed(String),

    /// An include the zone references failed, so its file was held back.
    #[error("Dependency failed: {0}")]
    DependencyFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(String),
}

impl ZoneError {
    /// Short machine-readable tag used in reports and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Cycle { .. } => "cycle",
            Self::InvalidEdge(_) => "invalid_edge",
            Self::Generation(_) => "generation",
            Self::InvalidPath(_) => "invalid_path",
            Self::ExternalTool(_) => "external_tool",
            Self::ValidationFailed(_) => "validation_failed",
            Self::DependencyFailed(_) => "dependency_failed",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for ZoneError {
    fn from(err: std::io::Error) -> Self {
        ZoneError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ZoneError>;
