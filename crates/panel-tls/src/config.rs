//! TLS reload settings

use crate::error::TlsError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default interval for the polling fallback
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default quiet period before a burst of file events is acted on
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Lowest protocol version the server negotiates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MinTlsVersion {
    /// TLS 1.2 and TLS 1.3
    #[default]
    Tls12,
    /// TLS 1.3 only
    Tls13,
}

impl MinTlsVersion {
    /// Protocol versions offered for this minimum, newest first
    pub fn protocol_versions(self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        static BOTH: &[&rustls::SupportedProtocolVersion] =
            &[&rustls::version::TLS13, &rustls::version::TLS12];
        static TLS13_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

        match self {
            Self::Tls12 => BOTH,
            Self::Tls13 => TLS13_ONLY,
        }
    }
}

impl FromStr for MinTlsVersion {
    type Err = TlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.2" => Ok(Self::Tls12),
            "1.3" => Ok(Self::Tls13),
            other => Err(TlsError::Settings(format!(
                "invalid TLS version: {other} (must be 1.2 or 1.3)"
            ))),
        }
    }
}

impl fmt::Display for MinTlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls12 => f.write_str("1.2"),
            Self::Tls13 => f.write_str("1.3"),
        }
    }
}

/// Where the certificate lives and how often to look for changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSettings {
    /// PEM certificate chain, leaf first
    pub cert_file: PathBuf,

    /// PEM private key
    pub key_file: PathBuf,

    /// Lowest protocol version offered
    pub min_tls_version: MinTlsVersion,

    /// Polling fallback interval, also the upper bound on detection latency
    pub poll_interval: Duration,

    /// Quiet period that closes a burst of file events
    pub debounce: Duration,

    /// Subscribe to filesystem notifications in addition to polling
    pub notify: bool,
}

impl ReloadSettings {
    /// Settings with default timings
    pub fn new(cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        Self {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            min_tls_version: MinTlsVersion::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            notify: true,
        }
    }

    /// Set the minimum protocol version
    pub fn min_tls_version(mut self, version: MinTlsVersion) -> Self {
        self.min_tls_version = version;
        self
    }

    /// Set the polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the debounce window
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Enable or disable filesystem notifications
    pub fn notify(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), TlsError> {
        if self.cert_file.as_os_str().is_empty() {
            return Err(TlsError::Settings("certificate path is empty".into()));
        }
        if self.key_file.as_os_str().is_empty() {
            return Err(TlsError::Settings("private key path is empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(TlsError::Settings("poll interval must be non-zero".into()));
        }
        if self.debounce.is_zero() {
            return Err(TlsError::Settings("debounce must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ReloadSettings::new("/tmp/tls.crt", "/tmp/tls.key");
        assert_eq!(settings.min_tls_version, MinTlsVersion::Tls12);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.debounce, Duration::from_millis(250));
        assert!(settings.notify);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_tls_version_parsing() {
        assert_eq!("1.2".parse::<MinTlsVersion>().unwrap(), MinTlsVersion::Tls12);
        assert_eq!("1.3".parse::<MinTlsVersion>().unwrap(), MinTlsVersion::Tls13);
        assert!("1.1".parse::<MinTlsVersion>().is_err());
        assert_eq!(MinTlsVersion::Tls13.to_string(), "1.3");
    }

    #[test]
    fn test_protocol_versions() {
        assert_eq!(MinTlsVersion::Tls12.protocol_versions().len(), 2);
        let only = MinTlsVersion::Tls13.protocol_versions();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].version, rustls::ProtocolVersion::TLSv1_3);
    }

    #[test]
    fn test_validate_rejects_zero_timings() {
        let settings = ReloadSettings::new("a", "b").poll_interval(Duration::ZERO);
        assert!(matches!(settings.validate(), Err(TlsError::Settings(_))));

        let settings = ReloadSettings::new("a", "b").debounce(Duration::ZERO);
        assert!(settings.validate().is_err());

        let settings = ReloadSettings::new("", "b");
        assert!(settings.validate().is_err());
    }
}
