//! Validated certificate/key pair

use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// SHA-256 over the certificate bytes followed by the key bytes.
///
/// Each input is length-prefixed so moving bytes between the two files
/// changes the fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint the raw contents of a certificate file and a key file
    pub fn of(cert: &[u8], key: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((cert.len() as u64).to_be_bytes());
        hasher.update(cert);
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key);
        Self(hasher.finalize().into())
    }

    /// Leading 8 bytes, enough to tell pairs apart in logs
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// A certificate chain and its private key, already validated.
///
/// Only [`crate::CertificateValidator`] constructs this type, so holding one
/// means the chain parsed and the key matches the leaf certificate.
pub struct CertificateKeyPair {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
    certified_key: Arc<CertifiedKey>,
    fingerprint: Fingerprint,
    subject: String,
    not_after: String,
}

impl CertificateKeyPair {
    pub(crate) fn new(
        cert_pem: Vec<u8>,
        key_pem: Vec<u8>,
        certified_key: CertifiedKey,
        subject: String,
        not_after: String,
    ) -> Self {
        let fingerprint = Fingerprint::of(&cert_pem, &key_pem);
        Self {
            cert_pem,
            key_pem,
            certified_key: Arc::new(certified_key),
            fingerprint,
            subject,
            not_after,
        }
    }

    /// Certificate and signing key handed to rustls during a handshake
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.certified_key)
    }

    /// Parsed chain, leaf first
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.certified_key.cert
    }

    /// Raw certificate file contents
    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    /// Raw key file contents
    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }

    /// Content fingerprint of both files
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Leaf certificate subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Leaf certificate expiry
    pub fn not_after(&self) -> &str {
        &self.not_after
    }
}

impl fmt::Debug for CertificateKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateKeyPair")
            .field("fingerprint", &self.fingerprint)
            .field("subject", &self.subject)
            .field("not_after", &self.not_after)
            .field("chain_len", &self.certified_key.cert.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_depends_on_both_files() {
        let a = Fingerprint::of(b"cert", b"key");
        assert_eq!(a, Fingerprint::of(b"cert", b"key"));
        assert_ne!(a, Fingerprint::of(b"cert", b"key2"));
        assert_ne!(a, Fingerprint::of(b"cert2", b"key"));
    }

    #[test]
    fn test_fingerprint_is_length_prefixed() {
        assert_ne!(Fingerprint::of(b"ab", b"c"), Fingerprint::of(b"a", b"bc"));
    }

    #[test]
    fn test_fingerprint_display() {
        let fp = Fingerprint::of(b"", b"");
        assert_eq!(fp.to_string().len(), 64);
        assert_eq!(fp.short().len(), 16);
        assert!(fp.to_string().starts_with(&fp.short()));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let pair = crate::testing::TestPair::generate("debug.local").validate();
        let debug = format!("{pair:?}");
        assert!(debug.contains("debug.local"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
