pub mod config;
mod error;
pub mod logging;
pub mod manager;
pub mod version;

pub use config::{Config, ConfigError, EnvSource, Environment, ProjectConfig};
pub use error::{Error, ErrorKind};
pub use manager::ConfigManager;
