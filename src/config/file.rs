//! File-based configuration source.

use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, error, warn};

use super::source::{value_kind, ConfigEntry, ConfigSource};
use super::ConfigError;

/// A configuration source that loads a YAML file from a config directory.
///
/// The file name is resolved against the directory and must stay inside it.
/// A missing file contributes nothing; a file that exists but cannot be
/// read or parsed fails the load.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
    file_name: String,
}

impl FileSource {
    pub fn new(dir: impl AsRef<Path>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            file_name: file_name.into(),
        }
    }
}

impl ConfigSource for FileSource {
    fn entries(&self, _current: &Mapping) -> Result<Vec<ConfigEntry>, ConfigError> {
        let path = resolve_within(&self.dir, &self.file_name)?;
        match load_config_file(&path)? {
            Some(mapping) => Ok(vec![ConfigEntry::root(mapping)]),
            None => Ok(vec![]),
        }
    }
}

/// Resolves `file_name` against `dir`, refusing anything that lands outside it.
///
/// The check is done lexically first, so nothing outside the directory is
/// ever touched, and then again on the canonical path to catch symlinks.
pub(crate) fn resolve_within(dir: &Path, file_name: &str) -> Result<PathBuf, ConfigError> {
    let root = dir.canonicalize().map_err(|source| ConfigError::ReadError {
        path: dir.to_path_buf(),
        source,
    })?;

    let candidate = normalize(&root.join(file_name));
    if !candidate.starts_with(&root) {
        error!(file = file_name, config_dir = %root.display(), "config path escapes the config directory");
        return Err(ConfigError::OutsideConfigDir {
            path: candidate,
            config_dir: root,
        });
    }

    match candidate.canonicalize() {
        Ok(real) if !real.starts_with(&root) => {
            error!(file = file_name, target = %real.display(), "config file links outside the config directory");
            Err(ConfigError::OutsideConfigDir {
                path: real,
                config_dir: root,
            })
        }
        _ => Ok(candidate),
    }
}

/// Collapses `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Loads and parses a YAML config file.
///
/// Returns `Ok(None)` if the file doesn't exist. An empty document is an
/// empty mapping.
fn load_config_file(path: &Path) -> Result<Option<Mapping>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not present, skipping");
            return Ok(None);
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read config file");
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let value: Value = serde_yaml::from_str(&contents).map_err(|e| {
        error!(path = %path.display(), error = %e, "failed to parse config file");
        ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    match value {
        Value::Mapping(mapping) => Ok(Some(mapping)),
        Value::Null => Ok(Some(Mapping::new())),
        other => {
            warn!(path = %path.display(), "config file is not a mapping");
            Err(ConfigError::NotAMapping {
                path: path.to_path_buf(),
                found: value_kind(&other),
            })
        }
    }
}
