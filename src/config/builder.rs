use std::path::Path;

use serde_yaml::Mapping;

use super::env::EnvSource;
use super::file::FileSource;
use super::project::{require_sections, ProjectConfig};
use super::source::{merge_entry, ConfigSource};
use super::ConfigError;

/// Builder for loading configuration from layered sources.
///
/// Sources are merged in registration order, with later sources overriding
/// earlier ones. Nested mappings are merged recursively; any other value
/// (including sequences) replaces what came before, even a whole mapping.
///
/// ## Example
///
/// ```no_run
/// use site_config::{Config, EnvSource};
///
/// let config = Config::builder()
///     .with_file("config", "base.yaml")
///     .with_file("config", "production.yaml")
///     .with_file("config", "local.yaml")
///     .with_env(EnvSource::from_process("APP_").ignore("APP_ENV"))
///     .build()?;
///
/// println!("database host: {:?}", config.database_value("host"));
/// # Ok::<(), site_config::ConfigError>(())
/// ```
#[derive(Debug, Default)]
#[must_use = "builders do nothing until .build() is called"]
pub struct Config {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl Config {
    /// Creates a new configuration builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Adds a literal mapping as a layer, typically the first one.
    pub fn with_defaults(self, defaults: Mapping) -> Self {
        self.with_source(defaults)
    }

    /// Adds a YAML file from `dir` to be loaded.
    ///
    /// Missing files are skipped. The file name must resolve inside `dir`.
    pub fn with_file(self, dir: impl AsRef<Path>, file_name: impl Into<String>) -> Self {
        self.with_source(FileSource::new(dir, file_name))
    }

    /// Adds environment-variable overrides.
    pub fn with_env(self, env: EnvSource) -> Self {
        self.with_source(env)
    }

    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Loads and merges every source, without validating the result.
    pub fn merge(self) -> Result<Mapping, ConfigError> {
        let mut merged = Mapping::new();
        for source in &self.sources {
            for entry in source.entries(&merged)? {
                merge_entry(&mut merged, entry)?;
            }
        }
        Ok(merged)
    }

    /// Merges every source, checks the required sections, and builds the
    /// validated [`ProjectConfig`].
    pub fn build(self) -> Result<ProjectConfig, ConfigError> {
        let merged = self.merge()?;
        require_sections(&merged)?;
        ProjectConfig::try_from(merged)
    }
}
