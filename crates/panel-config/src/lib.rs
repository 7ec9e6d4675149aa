//! # Panel Configuration
//!
//! Configuration management with support for:
//! - Multiple formats (YAML, TOML, JSON)
//! - Environment variable expansion (`${VAR}`, `${VAR:-default}`)
//! - Validation
//! - Default values
//! - Loading the plugin configuration served under `/config`

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod builder;
pub mod loader;
pub mod plugin;
pub mod types;
pub mod validator;

pub use builder::ConfigBuilder;
pub use loader::{load_config, load_from_file, load_from_str, ConfigFormat};
pub use plugin::{load_plugin_config, PluginConfigSource};
pub use types::{Config, LoggingConfig, SecretWatchConfig, ServerConfig, TlsConfig};
pub use validator::validate_config;
