//! Layered project configuration bound to a config directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{error, info};

use crate::config::{resolve_within, Config, ConfigError, EnvSource, ProjectConfig};
use crate::Error;

/// Prefix shared by every override variable.
pub const ENV_PREFIX: &str = "APP_";

/// Variable selecting the active environment. It is not an override.
pub const ENV_SELECTOR: &str = "APP_ENV";

pub const DEFAULT_ENVIRONMENT: &str = "development";

pub const BASE_FILE: &str = "base.yaml";
pub const LOCAL_FILE: &str = "local.yaml";

#[derive(Debug)]
enum LoadState {
    Unloaded,
    Loaded(ProjectConfig),
}

/// Loads a [`ProjectConfig`] from a config directory and caches it.
///
/// Layers, lowest to highest precedence:
///
/// 1. `base.yaml`
/// 2. `<environment>.yaml`, where the environment comes from `APP_ENV`
///    (default `development`)
/// 3. `local.yaml`
/// 4. `APP_*` variables from the environment snapshot taken at construction
///
/// All files are optional. The config is built on first access and kept
/// until [`reload`](Self::reload) is called.
///
/// ## Example
///
/// ```no_run
/// use site_config::ConfigManager;
///
/// let mut manager = ConfigManager::new("config")?;
/// let host = manager.get("database.host", "localhost")?;
/// println!("{host:?}");
/// # Ok::<(), site_config::Error>(())
/// ```
#[derive(Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
    environment: String,
    env_vars: BTreeMap<String, String>,
    state: LoadState,
}

impl ConfigManager {
    /// Creates a manager using a snapshot of the process environment.
    pub fn new(config_dir: impl AsRef<Path>) -> Result<Self, Error> {
        Self::with_env(config_dir, std::env::vars())
    }

    /// Creates a manager with an explicit set of environment variables.
    pub fn with_env<I, K, V>(config_dir: impl AsRef<Path>, vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let config_dir = resolve_config_dir(config_dir.as_ref())?;
        let env_vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let environment = env_vars
            .get(ENV_SELECTOR)
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        info!(config_dir = %config_dir.display(), environment = %environment, "config manager ready");

        Ok(Self {
            config_dir,
            environment,
            env_vars,
            state: LoadState::Unloaded,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Name of the active environment, as selected by `APP_ENV`.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LoadState::Loaded(_))
    }

    /// Returns the configuration, loading it on first access.
    ///
    /// A failed load leaves the manager unloaded, so the next call retries.
    pub fn config(&mut self) -> Result<&ProjectConfig, Error> {
        match self.state {
            LoadState::Loaded(ref config) => Ok(config),
            LoadState::Unloaded => {
                self.state = LoadState::Loaded(self.load()?);
                self.config()
            }
        }
    }

    /// Drops the cached configuration; the next access reads everything again.
    pub fn reload(&mut self) {
        self.state = LoadState::Unloaded;
    }

    /// Resolves a dotted key, returning `default` when any segment is missing.
    pub fn get(&mut self, key: &str, default: impl Into<Value>) -> Result<Value, Error> {
        Ok(self.config()?.get(key).unwrap_or_else(|| default.into()))
    }

    /// The configuration's five fields as a plain mapping.
    pub fn to_mapping(&mut self) -> Result<Mapping, Error> {
        Ok(self.config()?.to_mapping())
    }

    /// Writes the current configuration to `<environment>.yaml` in the
    /// config directory, returning the path written.
    pub fn save_config(&mut self) -> Result<PathBuf, Error> {
        let path = resolve_within(&self.config_dir, &self.environment_file())?;
        let contents = serde_yaml::to_string(self.config()?).map_err(ConfigError::from)?;

        std::fs::write(&path, contents).map_err(|source| {
            error!(path = %path.display(), error = %source, "failed to save config");
            ConfigError::WriteError {
                path: path.clone(),
                source,
            }
        })?;

        info!(path = %path.display(), "saved config");
        Ok(path)
    }

    fn environment_file(&self) -> String {
        format!("{}.yaml", self.environment)
    }

    fn load(&self) -> Result<ProjectConfig, Error> {
        let mut defaults = Mapping::new();
        defaults.insert("environment".into(), self.environment.as_str().into());

        let result = Config::builder()
            .with_defaults(defaults)
            .with_file(&self.config_dir, BASE_FILE)
            .with_file(&self.config_dir, self.environment_file())
            .with_file(&self.config_dir, LOCAL_FILE)
            .with_env(EnvSource::new(self.env_vars.clone(), ENV_PREFIX).ignore(ENV_SELECTOR))
            .build();

        match result {
            Ok(config) => {
                info!(environment = %config.environment(), debug = config.debug(), "configuration loaded");
                Ok(config)
            }
            Err(e) => {
                error!(config_dir = %self.config_dir.display(), error = %e, "failed to load configuration");
                Err(e.into())
            }
        }
    }
}

fn resolve_config_dir(path: &Path) -> Result<PathBuf, Error> {
    if !path.exists() {
        error!(path = %path.display(), "config directory does not exist");
        return Err(Error::ConfigDirNotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        error!(path = %path.display(), "config path is not a directory");
        return Err(Error::NotADirectory(path.to_path_buf()));
    }
    path.canonicalize()
        .map_err(|source| Error::ConfigDirUnresolvable {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Environment, ErrorKind};
    use tempfile::TempDir;

    const BASE: &str = r#"
debug: false
database:
  host: base-host
  port: 5432
  name: site
  user: admin
cache:
  backend: memory
  ttl_seconds: 60
logging:
  level: info
"#;

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    fn manager(dir: &TempDir, vars: &[(&str, &str)]) -> ConfigManager {
        ConfigManager::with_env(dir.path(), vars.iter().copied()).unwrap()
    }

    #[test]
    fn test_missing_directory_is_initialization_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        let err = ConfigManager::with_env(&missing, Vec::<(String, String)>::new()).unwrap_err();

        assert!(matches!(err, Error::ConfigDirNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Initialization);
    }

    #[test]
    fn test_file_as_directory_is_initialization_error() {
        let dir = config_dir(&[("base.yaml", BASE)]);

        let err = ConfigManager::with_env(dir.path().join("base.yaml"), Vec::<(String, String)>::new())
            .unwrap_err();

        assert!(matches!(err, Error::NotADirectory(_)));
        assert_eq!(err.kind(), ErrorKind::Initialization);
    }

    #[test]
    fn test_config_dir_is_absolute() {
        let dir = TempDir::new().unwrap();

        let manager = manager(&dir, &[]);

        assert!(manager.config_dir().is_absolute());
        assert_eq!(manager.environment(), "development");
    }

    #[test]
    fn test_environment_file_without_base() {
        let dev = BASE.replace("base-host", "dev-host");
        let dir = config_dir(&[("development.yaml", &dev)]);
        let mut manager = manager(&dir, &[]);

        let config = manager.config().unwrap();

        assert_eq!(config.database_value("host"), Some("dev-host"));
        assert_eq!(config.environment(), Environment::Development);
    }

    #[test]
    fn test_layer_precedence() {
        let dir = config_dir(&[
            ("base.yaml", BASE),
            ("production.yaml", "debug: true\ndatabase:\n  host: prod-host\n  name: prod\n"),
            ("local.yaml", "database:\n  name: local\n"),
        ]);
        let mut manager = manager(&dir, &[("APP_ENV", "production")]);

        let config = manager.config().unwrap();

        assert_eq!(config.environment(), Environment::Production);
        assert!(config.debug());
        assert_eq!(config.database_value("host"), Some("prod-host"));
        assert_eq!(config.database_value("name"), Some("local"));
        assert_eq!(config.database_value("user"), Some("admin"));
    }

    #[test]
    fn test_env_override_beats_files() {
        let dir = config_dir(&[("base.yaml", BASE), ("local.yaml", "database:\n  host: local-host\n")]);
        let mut manager = manager(&dir, &[("APP_DATABASE_HOST", "override-host")]);

        let config = manager.config().unwrap();

        assert_eq!(config.database_value("host"), Some("override-host"));
    }

    #[test]
    fn test_env_override_matches_underscore_keys() {
        let dir = config_dir(&[("base.yaml", BASE)]);
        let mut manager = manager(&dir, &[("APP_CACHE_TTL_SECONDS", "120")]);

        assert_eq!(manager.get("cache.ttl_seconds", Value::Null).unwrap(), Value::from("120"));
    }

    #[test]
    fn test_scalar_local_override_of_database_fails() {
        let dir = config_dir(&[
            ("base.yaml", BASE),
            ("local.yaml", "database: not-a-mapping\n"),
        ]);
        let mut manager = manager(&dir, &[]);

        let err = manager.config().unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::TypeMismatch { ref key, .. }) if key == "database"
        ));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!manager.is_loaded());
    }

    #[test]
    fn test_environment_name_traversal_is_security_error() {
        let outer = TempDir::new().unwrap();
        let config = outer.path().join("config");
        std::fs::create_dir(&config).unwrap();
        std::fs::write(config.join("base.yaml"), BASE).unwrap();
        std::fs::write(outer.path().join("evil.yaml"), "database: {host: leaked}\n").unwrap();

        let mut manager =
            ConfigManager::with_env(&config, [("APP_ENV", "../evil")]).unwrap();
        let err = manager.config().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Security);
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let dir = config_dir(&[("base.yaml", BASE)]);
        let mut manager = manager(&dir, &[("APP_ENV", "staging")]);

        let err = manager.config().unwrap_err();

        assert!(matches!(err, Error::Config(ConfigError::InvalidEnvironment(_))));
    }

    #[test]
    fn test_malformed_file_aborts_load() {
        let dir = config_dir(&[("base.yaml", BASE), ("local.yaml", "database: [oops\n")]);
        let mut manager = manager(&dir, &[]);

        let err = manager.config().unwrap_err();

        assert!(matches!(err, Error::Config(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_get_triggers_load_and_falls_back() {
        let dir = config_dir(&[("base.yaml", BASE)]);
        let mut manager = manager(&dir, &[]);
        assert!(!manager.is_loaded());

        let host = manager.get("database.host", "fallback").unwrap();
        assert!(manager.is_loaded());
        assert_eq!(host, Value::from("base-host"));

        let missing = manager.get("database.replica", "fallback").unwrap();
        assert_eq!(missing, Value::from("fallback"));
    }

    #[test]
    fn test_config_is_cached_until_reload() {
        let dir = config_dir(&[("base.yaml", BASE)]);
        let mut manager = manager(&dir, &[]);
        manager.config().unwrap();

        std::fs::write(dir.path().join("local.yaml"), "database:\n  host: changed\n").unwrap();
        assert_eq!(manager.config().unwrap().database_value("host"), Some("base-host"));

        manager.reload();
        assert!(!manager.is_loaded());
        assert_eq!(manager.config().unwrap().database_value("host"), Some("changed"));
    }

    #[test]
    fn test_failed_load_is_retried() {
        let dir = config_dir(&[("base.yaml", BASE), ("local.yaml", "database: [oops\n")]);
        let mut manager = manager(&dir, &[]);
        assert!(manager.config().is_err());
        assert!(!manager.is_loaded());

        std::fs::remove_file(dir.path().join("local.yaml")).unwrap();
        let config = manager.config().unwrap();

        assert_eq!(config.database_value("host"), Some("base-host"));
        assert!(manager.is_loaded());
    }

    #[test]
    fn test_to_mapping() {
        let dir = config_dir(&[("base.yaml", BASE)]);
        let mut manager = manager(&dir, &[]);

        let mapping = manager.to_mapping().unwrap();

        assert_eq!(mapping["environment"], Value::from("development"));
        assert_eq!(mapping["database"]["port"], Value::from("5432"));
    }

    #[test]
    fn test_save_config_writes_environment_file() {
        let dir = config_dir(&[("base.yaml", BASE)]);
        let mut manager = manager(&dir, &[("APP_ENV", "testing"), ("APP_LOGGING_LEVEL", "debug")]);

        let path = manager.save_config().unwrap();

        assert_eq!(path, manager.config_dir().join("testing.yaml"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("debug: false\nenvironment: testing\ndatabase:\n"));
        assert!(written.contains("  level: debug\n"));
        assert!(!written.contains('{'));

        let mut reloaded = ConfigManager::with_env(dir.path(), [("APP_ENV", "testing")]).unwrap();
        assert_eq!(reloaded.config().unwrap(), manager.config().unwrap());
    }

    #[test]
    fn test_new_reads_process_environment() {
        let dir = config_dir(&[("base.yaml", BASE)]);

        temp_env::with_vars(
            [("APP_ENV", Some("production")), ("APP_DATABASE_USER", Some("deploy"))],
            || {
                let mut manager = ConfigManager::new(dir.path()).unwrap();
                assert_eq!(manager.environment(), "production");
                assert_eq!(manager.config().unwrap().database_value("user"), Some("deploy"));
            },
        );
    }
}
