//! TLS acceptor

use crate::error::TlsError;
use crate::provider::TlsConfigProvider;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor as RustlsAcceptor;
use tracing::info;

/// TLS connection acceptor.
///
/// The server config is built once; the certificate is resolved per
/// handshake through the provider, so reloads take effect for the next
/// connection without rebuilding the acceptor.
#[derive(Clone)]
pub struct TlsAcceptor {
    inner: RustlsAcceptor,
    provider: TlsConfigProvider,
}

impl TlsAcceptor {
    /// Create an acceptor presenting the provider's current certificate
    pub fn new(provider: TlsConfigProvider) -> Result<Self, TlsError> {
        let config = provider.server_config()?;

        info!(min_tls = %provider.min_version(), "TLS acceptor initialized");

        Ok(Self {
            inner: RustlsAcceptor::from(config),
            provider,
        })
    }

    /// Certificate provider backing this acceptor
    pub fn provider(&self) -> &TlsConfigProvider {
        &self.provider
    }

    /// Run the server side of a handshake
    pub async fn accept<IO>(&self, stream: IO) -> Result<TlsStream<IO>, TlsError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        self.inner.accept(stream).await.map_err(TlsError::Handshake)
    }
}

impl std::fmt::Debug for TlsAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsAcceptor")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinTlsVersion;
    use crate::holder::ActiveCertificateState;
    use crate::testing::TestPair;
    use rustls::pki_types::ServerName;
    use rustls::{ClientConfig, RootCertStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::TlsConnector;

    fn connector(trusted: &[&TestPair], versions: MinTlsVersion) -> TlsConnector {
        let mut roots = RootCertStore::empty();
        for pair in trusted {
            roots.add(pair.cert_der()).unwrap();
        }
        let mut config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_protocol_versions(versions.protocol_versions())
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        // every handshake must present the current certificate
        config.resumption = rustls::client::Resumption::disabled();
        TlsConnector::from(Arc::new(config))
    }

    /// Handshake over an in-memory duplex and return the certificate the
    /// server presented
    async fn presented(acceptor: &TlsAcceptor, connector: &TlsConnector) -> Vec<u8> {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let server = {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let mut stream = acceptor.accept(server_io).await.unwrap();
                stream.write_all(b"pong").await.unwrap();
                stream.shutdown().await.unwrap();
            })
        };

        let name = ServerName::try_from("localhost").unwrap();
        let mut stream = connector.connect(name, client_io).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"pong");

        let (_, conn) = stream.get_ref();
        let leaf = conn.peer_certificates().unwrap()[0].as_ref().to_vec();
        server.await.unwrap();
        leaf
    }

    #[tokio::test]
    async fn test_handshake_follows_store() {
        let a = TestPair::generate("a.local");
        let b = TestPair::generate("b.local");
        let state = Arc::new(ActiveCertificateState::new(a.validate()));
        let acceptor =
            TlsAcceptor::new(TlsConfigProvider::new(state.clone(), MinTlsVersion::Tls12)).unwrap();
        let connector = connector(&[&a, &b], MinTlsVersion::Tls12);

        assert_eq!(presented(&acceptor, &connector).await, a.cert_der().as_ref());

        state.store(b.validate());
        assert_eq!(presented(&acceptor, &connector).await, b.cert_der().as_ref());
    }

    #[tokio::test]
    async fn test_tls13_only_rejects_tls12_client() {
        let a = TestPair::generate("a.local");
        let state = Arc::new(ActiveCertificateState::new(a.validate()));
        let acceptor =
            TlsAcceptor::new(TlsConfigProvider::new(state, MinTlsVersion::Tls13)).unwrap();

        let mut roots = RootCertStore::empty();
        roots.add(a.cert_der()).unwrap();
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_protocol_versions(&[&rustls::version::TLS12])
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let server = tokio::spawn(async move { acceptor.accept(server_io).await.is_err() });

        let name = ServerName::try_from("localhost").unwrap();
        assert!(connector.connect(name, client_io).await.is_err());
        assert!(server.await.unwrap());
    }
}
