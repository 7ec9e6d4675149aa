//! Plugin configuration loading
//!
//! The plugin configuration is a YAML file mounted next to the plugin. It is
//! read once at startup; its outcome decides what `/config` serves and which
//! request timeout the server applies.

use panel_core::PluginConfig;
use std::path::Path;
use std::time::Duration;
use tracing::{error, warn};

/// Request timeout used when no plugin configuration was loaded
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of loading the plugin configuration file
#[derive(Debug, Clone, PartialEq)]
pub enum PluginConfigSource {
    /// No file configured, or the file could not be read
    Missing,
    /// The file was read but is not valid plugin configuration
    Invalid(String),
    /// The file was parsed
    Loaded(PluginConfig),
}

impl PluginConfigSource {
    /// Request timeout the server should enforce, `None` for no limit
    pub fn request_timeout(&self) -> Option<Duration> {
        match self {
            PluginConfigSource::Loaded(config) => config.effective_timeout(),
            PluginConfigSource::Missing | PluginConfigSource::Invalid(_) => {
                Some(DEFAULT_REQUEST_TIMEOUT)
            }
        }
    }
}

/// Load the plugin configuration, logging why a default is used
pub fn load_plugin_config(path: Option<&Path>) -> PluginConfigSource {
    let Some(path) = path else {
        warn!("No plugin config file configured, serving plugin with default configuration");
        return PluginConfigSource::Missing;
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(
                error = %e,
                path = %path.display(),
                "Cannot read config file, serving plugin with default configuration"
            );
            return PluginConfigSource::Missing;
        }
    };

    if content.trim().is_empty() {
        return PluginConfigSource::Loaded(PluginConfig::default());
    }

    match serde_yaml::from_str::<Option<PluginConfig>>(&content) {
        Ok(config) => PluginConfigSource::Loaded(config.unwrap_or_default()),
        Err(e) => {
            error!(error = %e, path = %path.display(), "Unable to unmarshall config data");
            PluginConfigSource::Invalid(e.to_string())
        }
    }
}
