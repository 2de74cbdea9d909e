use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use super::source::{ConfigEntry, ConfigSource};
use super::ConfigError;

/// Overrides taken from a snapshot of environment variables.
///
/// A variable named `<prefix>DATABASE_HOST` sets `database.host` to the
/// variable's string value. Names are lowercased and split on `_`.
///
/// Because `_` is both the separator and a legal key character, the path is
/// matched against keys that already exist: at each level the longest run of
/// segments that names an existing key wins. With `cache.ttl_seconds` present,
/// `APP_CACHE_TTL_SECONDS` sets `cache.ttl_seconds`; without it, the variable
/// creates `cache.ttl.seconds`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    vars: BTreeMap<String, String>,
    prefix: String,
    ignored: Vec<String>,
}

impl EnvSource {
    pub fn new<I, K, V>(vars: I, prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            prefix: prefix.into(),
            ignored: Vec::new(),
        }
    }

    /// Snapshots the current process environment.
    pub fn from_process(prefix: impl Into<String>) -> Self {
        Self::new(std::env::vars(), prefix)
    }

    /// Excludes a variable that shares the prefix but is not an override.
    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored.push(name.into());
        self
    }
}

impl ConfigSource for EnvSource {
    fn entries(&self, current: &Mapping) -> Result<Vec<ConfigEntry>, ConfigError> {
        let mut entries = Vec::new();

        for (name, value) in &self.vars {
            if self.ignored.iter().any(|ignored| ignored == name) {
                continue;
            }
            let Some(path_str) = name.strip_prefix(&self.prefix) else {
                continue;
            };

            let segments: Vec<String> = path_str
                .to_lowercase()
                .split('_')
                .map(str::to_owned)
                .collect();
            if segments.iter().any(String::is_empty) {
                warn!(variable = %name, "ignoring override with an empty key segment");
                continue;
            }

            let path = resolve_key_path(Some(current), &segments);
            debug!(variable = %name, key = %path.join("."), "applying environment override");
            entries.push(ConfigEntry::at_path(path, Value::String(value.clone())));
        }

        Ok(entries)
    }
}

fn resolve_key_path(current: Option<&Mapping>, segments: &[String]) -> Vec<String> {
    if segments.is_empty() {
        return Vec::new();
    }

    if let Some(mapping) = current {
        for take in (1..=segments.len()).rev() {
            let key = segments[..take].join("_");
            let rest = &segments[take..];
            match mapping.get(key.as_str()) {
                Some(_) if rest.is_empty() => return vec![key],
                Some(Value::Mapping(child)) => {
                    let mut path = vec![key];
                    path.extend(resolve_key_path(Some(child), rest));
                    return path;
                }
                _ => {}
            }
        }
    }

    segments.to_vec()
}
