//! Configuration types

use panel_core::FeatureFlags;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// TLS configuration; plain HTTP when absent
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Kubernetes secret watch
    #[serde(default)]
    pub secrets: SecretWatchConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// TLS settings when both the certificate and key paths are set
    pub fn tls_enabled(&self) -> Option<&TlsConfig> {
        self.tls.as_ref().filter(|tls| tls.is_enabled())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: SocketAddr,

    /// Directory holding the built plugin assets
    pub static_path: PathBuf,

    /// Plugin configuration YAML served under `/config`
    pub plugin_config_path: Option<PathBuf>,

    /// Feature flags served under `/features`
    pub features: FeatureFlags,

    /// Graceful shutdown timeout (wait for open connections)
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            static_path: PathBuf::from("./web/dist"),
            plugin_config_path: None,
            features: FeatureFlags::default(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsConfig {
    /// Certificate file path (PEM, leaf first)
    pub cert_file: String,

    /// Private key file path (PEM)
    pub key_file: String,

    /// Minimum TLS version (1.2 or 1.3)
    #[serde(default = "default_min_tls_version")]
    pub min_tls_version: String,

    /// Fallback poll interval for detecting certificate changes
    #[serde(default = "default_reload_interval", with = "humantime_serde")]
    pub reload_interval: Duration,

    /// Quiet period used to coalesce bursts of file change notifications
    #[serde(default = "default_reload_debounce", with = "humantime_serde")]
    pub reload_debounce: Duration,
}

impl TlsConfig {
    /// Create TLS settings for a certificate/key pair with default reload timings
    pub fn new(cert_file: impl Into<String>, key_file: impl Into<String>) -> Self {
        Self {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            min_tls_version: default_min_tls_version(),
            reload_interval: default_reload_interval(),
            reload_debounce: default_reload_debounce(),
        }
    }

    /// TLS is served only when both paths are set
    pub fn is_enabled(&self) -> bool {
        !self.cert_file.is_empty() && !self.key_file.is_empty()
    }
}

/// Kubernetes secret watch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecretWatchConfig {
    /// Enable the secret watch
    pub enabled: bool,

    /// Namespace filter (None = all namespaces)
    pub namespace: Option<String>,
}

impl Default for SecretWatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9443))
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_min_tls_version() -> String {
    "1.2".to_string()
}

fn default_reload_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_reload_debounce() -> Duration {
    Duration::from_millis(250)
}
