use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("config file '{path}' must contain a mapping at the top level, found {found}")]
    NotAMapping { path: PathBuf, found: &'static str },

    #[error("config path '{path}' resolves outside the config directory '{config_dir}'")]
    OutsideConfigDir { path: PathBuf, config_dir: PathBuf },

    #[error("non-string key {key} under '{parent}'")]
    NonStringKey { parent: String, key: String },

    #[error("type mismatch at '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("unsupported YAML tag '{tag}' at '{key}'")]
    UnsupportedTag { key: String, tag: String },

    #[error("missing required section: {0}")]
    MissingSection(&'static str),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid environment '{0}': must be one of development, testing, production")]
    InvalidEnvironment(String),

    #[error("database configuration is missing required key '{0}'")]
    MissingDatabaseKey(&'static str),

    #[error("logging configuration is missing required key 'level'")]
    MissingLoggingLevel,

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] serde_yaml::Error),

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Returns `true` for path-containment violations.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::OutsideConfigDir { .. })
    }
}
