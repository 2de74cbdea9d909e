//! The validated project configuration.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::warn;

use super::source::value_kind;
use super::ConfigError;

/// Sections that must be present (as mappings) before a [`ProjectConfig`]
/// can be built.
pub const REQUIRED_SECTIONS: [&str; 3] = ["database", "logging", "cache"];

/// Keys every `database` section must define.
pub const REQUIRED_DATABASE_KEYS: [&str; 4] = ["host", "port", "name", "user"];

/// Deployment environment a configuration was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "testing" => Ok(Self::Testing),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

/// Immutable, validated project settings.
///
/// Built once per load. Every invariant is checked at construction, so a
/// value of this type is always usable:
///
/// - `environment` is one of `development`, `testing`, `production`
/// - `database` holds string values for at least `host`, `port`, `name`, `user`
/// - `logging` has a `level`
///
/// Serializes with the fields in declaration order, which is the layout
/// written back by [`ConfigManager::save_config`](crate::ConfigManager::save_config).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectConfig {
    debug: bool,
    environment: Environment,
    database: Mapping,
    cache: Mapping,
    logging: Mapping,
}

impl ProjectConfig {
    /// Builds a config from its parts, validating every field.
    pub fn new(
        debug: bool,
        environment: &str,
        database: Mapping,
        cache: Mapping,
        logging: Mapping,
    ) -> Result<Self, ConfigError> {
        let environment = environment.parse()?;
        let database = normalize_database(database)?;
        if !logging.contains_key("level") {
            return Err(ConfigError::MissingLoggingLevel);
        }

        Ok(Self {
            debug,
            environment,
            database,
            cache,
            logging,
        })
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn database(&self) -> &Mapping {
        &self.database
    }

    /// Returns a database setting. All database values are strings.
    pub fn database_value(&self, key: &str) -> Option<&str> {
        self.database.get(key).and_then(Value::as_str)
    }

    pub fn cache(&self) -> &Mapping {
        &self.cache
    }

    pub fn logging(&self) -> &Mapping {
        &self.logging
    }

    /// Resolves a dotted path such as `database.host` or `cache.redis.url`.
    ///
    /// The first segment names one of the five fields; later segments walk
    /// nested mappings. Returns `None` if any segment is missing.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut segments = key.split('.');
        let mut current = self.field(segments.next()?)?;
        for segment in segments {
            current = current.as_mapping()?.get(segment)?.clone();
        }
        Some(current)
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "debug" => Some(Value::Bool(self.debug)),
            "environment" => Some(Value::String(self.environment.to_string())),
            "database" => Some(Value::Mapping(self.database.clone())),
            "cache" => Some(Value::Mapping(self.cache.clone())),
            "logging" => Some(Value::Mapping(self.logging.clone())),
            _ => None,
        }
    }

    /// The five fields as a plain mapping, in declaration order.
    pub fn to_mapping(&self) -> Mapping {
        let mut mapping = Mapping::new();
        for name in ["debug", "environment", "database", "cache", "logging"] {
            if let Some(value) = self.field(name) {
                mapping.insert(Value::from(name), value);
            }
        }
        mapping
    }
}

impl TryFrom<Mapping> for ProjectConfig {
    type Error = ConfigError;

    fn try_from(mut mapping: Mapping) -> Result<Self, Self::Error> {
        let debug = match mapping.remove("debug") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            // Environment overrides always arrive as strings.
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
            Some(other) => {
                return Err(ConfigError::TypeMismatch {
                    key: "debug".into(),
                    expected: "boolean",
                    found: value_kind(&other),
                })
            }
        };

        let environment = match mapping.remove("environment") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(ConfigError::TypeMismatch {
                    key: "environment".into(),
                    expected: "string",
                    found: value_kind(&other),
                })
            }
            None => return Err(ConfigError::MissingField("environment")),
        };

        let database = take_section(&mut mapping, "database")?;
        let cache = take_section(&mut mapping, "cache")?;
        let logging = take_section(&mut mapping, "logging")?;

        for key in mapping.keys() {
            warn!(key = ?key, "ignoring unknown top-level config key");
        }

        Self::new(debug, &environment, database, cache, logging)
    }
}

/// Checks that every required section exists and is a mapping.
pub fn require_sections(mapping: &Mapping) -> Result<(), ConfigError> {
    for section in REQUIRED_SECTIONS {
        match mapping.get(section) {
            Some(Value::Mapping(_)) => {}
            Some(other) => {
                return Err(ConfigError::TypeMismatch {
                    key: section.to_string(),
                    expected: "mapping",
                    found: value_kind(other),
                })
            }
            None => return Err(ConfigError::MissingSection(section)),
        }
    }
    Ok(())
}

fn take_section(mapping: &mut Mapping, section: &'static str) -> Result<Mapping, ConfigError> {
    match mapping.remove(section) {
        Some(Value::Mapping(m)) => Ok(m),
        Some(other) => Err(ConfigError::TypeMismatch {
            key: section.to_string(),
            expected: "mapping",
            found: value_kind(&other),
        }),
        None => Err(ConfigError::MissingSection(section)),
    }
}

/// Renders scalar database values as strings and checks required keys.
fn normalize_database(database: Mapping) -> Result<Mapping, ConfigError> {
    let mut normalized = Mapping::new();
    for (key, value) in database {
        let name = match &key {
            Value::String(s) => s.clone(),
            other => {
                return Err(ConfigError::NonStringKey {
                    parent: "database".into(),
                    key: format!("{other:?}"),
                })
            }
        };
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(ConfigError::TypeMismatch {
                    key: format!("database.{name}"),
                    expected: "string",
                    found: value_kind(&other),
                })
            }
        };
        normalized.insert(key, Value::String(value));
    }

    for key in REQUIRED_DATABASE_KEYS {
        if !normalized.contains_key(key) {
            return Err(ConfigError::MissingDatabaseKey(key));
        }
    }
    Ok(normalized)
}
