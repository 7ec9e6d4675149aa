//! Self-signed certificate fixtures for tests
//!
//! Available in unit tests and, behind the `testing` feature, to other
//! workspace crates' tests.

#![allow(clippy::expect_used, missing_docs)]

use crate::pair::{CertificateKeyPair, Fingerprint};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::CertificateDer;
use std::path::{Path, PathBuf};

/// Freshly generated PEM certificate and key.
///
/// The certificate carries `common_name` as CN and as a SAN, plus a
/// `localhost` SAN so clients can verify it on loopback.
#[derive(Debug, Clone)]
pub struct TestPair {
    pub cert_pem: String,
    pub key_pem: String,
}

impl TestPair {
    pub fn generate(common_name: &str) -> Self {
        let mut params =
            CertificateParams::new(vec![common_name.to_string(), "localhost".to_string()])
                .expect("certificate params");
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;

        let key_pair = KeyPair::generate().expect("key generation");
        let cert = params.self_signed(&key_pair).expect("self-signed certificate");

        Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        }
    }

    /// Validated form of this pair
    pub fn validate(&self) -> CertificateKeyPair {
        crate::validate(self.cert_pem.as_bytes(), self.key_pem.as_bytes())
            .expect("generated pair is valid")
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.cert_pem.as_bytes(), self.key_pem.as_bytes())
    }

    /// DER of the certificate, for client trust stores
    pub fn cert_der(&self) -> CertificateDer<'static> {
        rustls_pemfile::certs(&mut self.cert_pem.as_bytes())
            .next()
            .expect("one certificate")
            .expect("certificate PEM")
    }

    /// Write both files, replacing any previous content
    pub fn write(&self, cert_path: &Path, key_path: &Path) {
        std::fs::write(cert_path, &self.cert_pem).expect("write certificate");
        std::fs::write(key_path, &self.key_pem).expect("write key");
    }
}

/// Temporary directory holding `tls.crt` and `tls.key`
#[derive(Debug)]
pub struct CertDir {
    dir: tempfile::TempDir,
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertDir {
    /// Empty directory, no files written yet
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let cert_path = dir.path().join("tls.crt");
        let key_path = dir.path().join("tls.key");
        Self {
            dir,
            cert_path,
            key_path,
        }
    }

    /// Directory with `pair` already written
    pub fn with_pair(pair: &TestPair) -> Self {
        let dir = Self::new();
        dir.install(pair);
        dir
    }

    pub fn install(&self, pair: &TestPair) {
        pair.write(&self.cert_path, &self.key_path);
    }

    pub fn write_cert(&self, contents: &str) {
        std::fs::write(&self.cert_path, contents).expect("write certificate");
    }

    pub fn write_key(&self, contents: &str) {
        std::fs::write(&self.key_path, contents).expect("write key");
    }

    pub fn remove_key(&self) {
        std::fs::remove_file(&self.key_path).expect("remove key");
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

impl Default for CertDir {
    fn default() -> Self {
        Self::new()
    }
}
