//! Configuration builder

use crate::types::{Config, TlsConfig};
use panel_core::FeatureFlags;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Builder for constructing configuration programmatically
///
/// Starts from an existing configuration (file or defaults) and applies
/// overrides, which is how command line flags are layered over a file.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder from defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Set listen address
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.config.server.listen = addr;
        self
    }

    /// Set only the listen port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.listen.set_port(port);
        self
    }

    /// Set the static asset directory
    pub fn static_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.server.static_path = path.into();
        self
    }

    /// Set the plugin configuration file
    pub fn plugin_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.server.plugin_config_path = Some(path.into());
        self
    }

    /// Set feature flags
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.config.server.features = features;
        self
    }

    /// Set the graceful shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.shutdown_timeout = timeout;
        self
    }

    /// Set TLS configuration
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    /// Set the certificate/key pair, keeping other TLS settings
    pub fn tls_files(mut self, cert_file: impl Into<String>, key_file: impl Into<String>) -> Self {
        let (cert_file, key_file) = (cert_file.into(), key_file.into());
        match self.config.tls.as_mut() {
            Some(tls) => {
                tls.cert_file = cert_file;
                tls.key_file = key_file;
            }
            None => self.config.tls = Some(TlsConfig::new(cert_file, key_file)),
        }
        self
    }

    /// Set the minimum TLS version on an existing TLS section
    pub fn min_tls_version(mut self, version: impl Into<String>) -> Self {
        if let Some(tls) = self.config.tls.as_mut() {
            tls.min_tls_version = version.into();
        }
        self
    }

    /// Disable TLS
    pub fn without_tls(mut self) -> Self {
        self.config.tls = None;
        self
    }

    /// Enable or disable the secret watch
    pub fn watch_secrets(mut self, enabled: bool) -> Self {
        self.config.secrets.enabled = enabled;
        self
    }

    /// Restrict the secret watch to a namespace
    pub fn secrets_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.secrets.namespace = Some(namespace.into());
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Set log format
    pub fn log_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> panel_core::Result<Config> {
        crate::validator::validate_config(&self.config)?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().static_path("dist").build().unwrap();
        assert_eq!(config.server.listen.port(), 9443);
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_builder_overrides_file_values() {
        let mut base = Config::default();
        base.tls = Some(TlsConfig::new("/old/tls.crt", "/old/tls.key"));
        base.tls.as_mut().unwrap().min_tls_version = "1.3".to_string();

        let config = ConfigBuilder::from_config(base)
            .port(8443)
            .tls_files("/new/tls.crt", "/new/tls.key")
            .features(FeatureFlags::parse("korrel8r"))
            .build()
            .unwrap();

        assert_eq!(config.server.listen.port(), 8443);
        let tls = config.tls.unwrap();
        assert_eq!(tls.cert_file, "/new/tls.crt");
        assert_eq!(tls.min_tls_version, "1.3");
        assert!(config.server.features.is_enabled("korrel8r"));
    }

    #[test]
    fn test_builder_rejects_invalid() {
        let result = ConfigBuilder::new().log_level("loud").build();
        assert!(result.is_err());
    }
}
