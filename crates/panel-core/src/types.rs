//! Common types shared across the plugin backend

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Feature flags exposed to the console under `/features`.
///
/// Serializes as a JSON object mapping each enabled feature to `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureFlags(BTreeMap<String, bool>);

impl FeatureFlags {
    /// Create an empty set of flags
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated list such as `"Korrel8r, netflow"`.
    ///
    /// Names are trimmed and lowercased; empty entries are skipped.
    pub fn parse(list: &str) -> Self {
        let flags = list
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .map(|name| (name, true))
            .collect();
        Self(flags)
    }

    /// Enable a feature
    pub fn enable(&mut self, name: impl Into<String>) {
        self.0.insert(name.into(), true);
    }

    /// Whether a feature is enabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    /// Number of configured flags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no flags are configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, enabled)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(name, enabled)| (name.as_str(), *enabled))
    }
}

impl FromStr for FeatureFlags {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for FeatureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(name, _)| name)
            .collect();
        write!(f, "{}", names.join(","))
    }
}

/// Plugin configuration read from the plugin config YAML file.
///
/// The YAML form takes human readable durations (`timeout: 45s`). The JSON
/// form served to the console expresses `timeout` in seconds as a float and
/// omits it when unset or zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PluginConfig {
    /// Request timeout applied by the console and by this server
    #[serde(default, deserialize_with = "humantime_serde::deserialize")]
    pub timeout: Option<Duration>,
}

impl PluginConfig {
    /// Timeout to apply to the server, if one is configured and non-zero
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

impl Serialize for PluginConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let timeout = self.effective_timeout();
        let mut map = serializer.serialize_map(Some(usize::from(timeout.is_some())))?;
        if let Some(timeout) = timeout {
            map.serialize_entry("timeout", &timeout.as_secs_f64())?;
        }
        map.end()
    }
}
