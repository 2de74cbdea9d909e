use std::path::PathBuf;

use crate::config::ConfigError;
use thiserror::Error;

/// Top-level error type for the site-config library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("config directory does not exist: {0}")]
    ConfigDirNotFound(PathBuf),

    #[error("config path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("cannot resolve config directory '{path}': {source}")]
    ConfigDirUnresolvable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Broad failure category, for callers that branch on the kind of failure
/// rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The manager could not be created.
    Initialization,
    /// A load or save attempt failed.
    Configuration,
    /// A config path escaped the config directory.
    Security,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigDirNotFound(_)
            | Self::NotADirectory(_)
            | Self::ConfigDirUnresolvable { .. } => ErrorKind::Initialization,
            Self::Config(e) if e.is_security() => ErrorKind::Security,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }
}
