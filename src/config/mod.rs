//! Configuration loading and management.

mod builder;
mod env;
mod error;
mod file;
mod project;
mod source;

pub(crate) use file::resolve_within;

pub use builder::Config;
pub use env::EnvSource;
pub use error::ConfigError;
pub use file::FileSource;
pub use project::{Environment, ProjectConfig, REQUIRED_DATABASE_KEYS, REQUIRED_SECTIONS};
pub use source::{deep_merge, ConfigEntry, ConfigSource};
