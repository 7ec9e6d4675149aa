//! Error types for certificate loading and reloading

use std::path::PathBuf;

/// A candidate certificate/key pair was rejected
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The certificate PEM could not be decoded
    #[error("certificate PEM is malformed: {0}")]
    MalformedCertificatePem(String),

    /// The certificate PEM holds no certificate
    #[error("no certificate found in PEM data")]
    NoCertificate,

    /// A certificate in the chain is not valid X.509
    #[error("certificate #{index} in chain is not valid X.509: {reason}")]
    InvalidCertificate {
        /// Position in the chain, leaf is 0
        index: usize,
        /// Parser message
        reason: String,
    },

    /// The key PEM could not be decoded
    #[error("private key PEM is malformed: {0}")]
    MalformedKeyPem(String),

    /// The key PEM holds no PKCS#1, PKCS#8 or SEC1 key
    #[error("no private key found in PEM data")]
    NoPrivateKey,

    /// The key algorithm is not supported by the crypto provider
    #[error("unsupported private key: {0}")]
    UnsupportedKey(String),

    /// The private key does not belong to the leaf certificate
    #[error("private key does not match certificate: {0}")]
    KeyMismatch(String),
}

/// A certificate or key file could not be read right now
#[derive(Debug, thiserror::Error)]
#[error("failed to read {}: {source}", path.display())]
pub struct TransientReadError {
    /// File that failed
    pub path: PathBuf,
    /// Underlying I/O error
    #[source]
    pub source: std::io::Error,
}

impl TransientReadError {
    pub(crate) fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// The pair present at startup cannot be served
#[derive(Debug, thiserror::Error)]
pub enum InitialLoadError {
    /// A file is missing or unreadable
    #[error("unable to read initial certificate/key pair: {0}")]
    Read(#[from] TransientReadError),

    /// The files do not form a valid pair
    #[error("invalid certificate/key files: {0}")]
    Invalid(#[from] ValidationError),
}

/// Errors raised while setting up TLS
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Initial certificate load failed
    #[error(transparent)]
    InitialLoad(#[from] InitialLoadError),

    /// Invalid reload settings
    #[error("invalid TLS settings: {0}")]
    Settings(String),

    /// rustls refused the server configuration
    #[error("failed to build TLS config: {0}")]
    Rustls(#[from] rustls::Error),

    /// Handshake with a client failed
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),
}

impl From<TlsError> for panel_core::Error {
    fn from(err: TlsError) -> Self {
        panel_core::Error::Tls(err.to_string())
    }
}
