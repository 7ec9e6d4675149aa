//! Per-handshake certificate selection

use crate::config::MinTlsVersion;
use crate::error::TlsError;
use crate::holder::ActiveCertificateState;
use crate::pair::CertificateKeyPair;
use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use std::fmt;
use std::sync::Arc;

/// Anything able to hand out the certificate to present right now
pub trait CertificateSource: Send + Sync + fmt::Debug {
    /// Current certificate/key pair
    fn current_certificate(&self) -> Arc<CertificateKeyPair>;
}

impl CertificateSource for ActiveCertificateState {
    fn current_certificate(&self) -> Arc<CertificateKeyPair> {
        self.load()
    }
}

/// Builds the rustls server config and answers rustls' certificate callback
/// from the active certificate slot.
#[derive(Clone)]
pub struct TlsConfigProvider {
    source: Arc<dyn CertificateSource>,
    min_version: MinTlsVersion,
    crypto: Arc<CryptoProvider>,
}

impl TlsConfigProvider {
    /// Provider reading from `source` with the ring crypto provider
    pub fn new(source: Arc<dyn CertificateSource>, min_version: MinTlsVersion) -> Self {
        Self::with_crypto_provider(
            source,
            min_version,
            Arc::new(rustls::crypto::ring::default_provider()),
        )
    }

    /// Provider using a specific crypto provider
    pub fn with_crypto_provider(
        source: Arc<dyn CertificateSource>,
        min_version: MinTlsVersion,
        crypto: Arc<CryptoProvider>,
    ) -> Self {
        Self {
            source,
            min_version,
            crypto,
        }
    }

    /// Minimum protocol version offered
    pub fn min_version(&self) -> MinTlsVersion {
        self.min_version
    }

    /// Server config with this provider installed as the certificate resolver
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, TlsError> {
        let mut config = ServerConfig::builder_with_provider(Arc::clone(&self.crypto))
            .with_protocol_versions(self.min_version.protocol_versions())?
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(self.clone()));

        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Arc::new(config))
    }
}

impl CertificateSource for TlsConfigProvider {
    fn current_certificate(&self) -> Arc<CertificateKeyPair> {
        self.source.current_certificate()
    }
}

impl ResolvesServerCert for TlsConfigProvider {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.source.current_certificate().certified_key())
    }
}

impl fmt::Debug for TlsConfigProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfigProvider")
            .field("source", &self.source)
            .field("min_version", &self.min_version)
            .finish_non_exhaustive()
    }
}
