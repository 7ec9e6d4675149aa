//! Configuration loading

use crate::Config;
use panel_core::{Error, Result};
use regex::{Captures, Regex};
use std::env;
use std::fs;
use std::path::Path;

/// `${NAME}` or `${NAME:-fallback}`
const ENV_REFERENCE: &str = r"\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<fallback>[^}]*))?\}";

/// Document format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` or `.yml`
    Yaml,
    /// `.toml`
    Toml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// Format named by the file extension, ignoring case
    pub fn for_file(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn parse(self, document: &str) -> Result<Config> {
        let parsed = match self {
            Self::Yaml => serde_yaml::from_str(document).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(document).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(document).map_err(|e| e.to_string()),
        };
        parsed.map_err(|reason| Error::Config(format!("Invalid {self:?} configuration: {reason}")))
    }
}

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let format = ConfigFormat::for_file(path).ok_or_else(|| {
        Error::Config(format!(
            "Cannot tell the format of {}: expected a .yaml, .yml, .toml or .json file",
            path.display()
        ))
    })?;

    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    load_from_str(&content, format)
}

/// Replace environment references with their values.
///
/// Every reference without a fallback must name a set variable; the error
/// lists all that are not.
fn substitute_env(content: &str) -> Result<String> {
    let reference = Regex::new(ENV_REFERENCE)
        .map_err(|e| Error::Config(format!("Invalid environment reference pattern: {e}")))?;

    let mut unset: Vec<String> = Vec::new();
    let substituted = reference.replace_all(content, |caps: &Captures<'_>| {
        let name = &caps["name"];
        match (env::var(name), caps.name("fallback")) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.as_str().to_owned(),
            (Err(_), None) => {
                if !unset.iter().any(|seen| seen == name) {
                    unset.push(name.to_owned());
                }
                String::new()
            }
        }
    });

    if !unset.is_empty() {
        return Err(Error::Config(format!(
            "Environment variables not set and without a fallback: {}",
            unset.join(", ")
        )));
    }

    Ok(substituted.into_owned())
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    format.parse(&substitute_env(content)?)
}

/// Load and validate configuration from a file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;

    crate::validator::validate_config(&config)?;

    Ok(config)
}
