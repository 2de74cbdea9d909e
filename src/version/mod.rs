//! Release history kept in a YAML file.

mod history;

use std::path::PathBuf;

use thiserror::Error;

pub use history::{VersionHistory, VersionInfo};
pub use semver::Version;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VersionError {
    #[error("invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        source: semver::Error,
    },

    #[error("release date {0} is in the future")]
    FutureReleaseDate(chrono::NaiveDateTime),

    #[error("invalid release date '{0}': expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS")]
    InvalidDate(String),

    #[error("changes list cannot be empty")]
    NoChanges,

    #[error("author cannot be empty")]
    EmptyAuthor,

    #[error("no versions found")]
    Empty,

    #[error("version {0} not found")]
    NotFound(String),

    #[error("version {0} already exists")]
    Duplicate(String),

    #[error("new version {new} must be greater than current version {current}")]
    NotNewer { new: String, current: String },

    #[error("failed to read version history '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse version history '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid entry {index} in version history: {source}")]
    InvalidEntry {
        index: usize,
        source: Box<VersionError>,
    },

    #[error("failed to serialize version history: {0}")]
    SerializeError(#[source] serde_yaml::Error),

    #[error("failed to write version history '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
}
