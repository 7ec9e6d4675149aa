//! Certificate/key pair validation

use crate::error::ValidationError;
use crate::pair::CertificateKeyPair;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use std::fmt;
use std::sync::Arc;
use x509_parser::parse_x509_certificate;

/// Validate a PEM certificate chain and PEM private key with the default
/// crypto provider.
pub fn validate(cert_pem: &[u8], key_pem: &[u8]) -> Result<CertificateKeyPair, ValidationError> {
    CertificateValidator::default().validate(cert_pem, key_pem)
}

/// Turns raw file contents into a [`CertificateKeyPair`].
///
/// Checks run in order: the chain parses as X.509, the key parses as a key
/// the crypto provider can sign with, and the key matches the leaf.
#[derive(Clone)]
pub struct CertificateValidator {
    provider: Arc<CryptoProvider>,
}

impl CertificateValidator {
    /// Validator backed by a specific crypto provider
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }

    /// Crypto provider used to load keys
    pub fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Validate a candidate pair
    pub fn validate(
        &self,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<CertificateKeyPair, ValidationError> {
        let chain = parse_chain(cert_pem)?;
        let (subject, not_after) = describe_chain(&chain)?;

        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|e| ValidationError::MalformedKeyPem(e.to_string()))?
            .ok_or(ValidationError::NoPrivateKey)?;

        let signing_key = self
            .provider
            .key_provider
            .load_private_key(key)
            .map_err(|e| ValidationError::UnsupportedKey(e.to_string()))?;

        let certified_key = CertifiedKey::new(chain, signing_key);
        certified_key
            .keys_match()
            .map_err(|e| ValidationError::KeyMismatch(e.to_string()))?;

        Ok(CertificateKeyPair::new(
            cert_pem.to_vec(),
            key_pem.to_vec(),
            certified_key,
            subject,
            not_after,
        ))
    }
}

impl Default for CertificateValidator {
    fn default() -> Self {
        Self::new(Arc::new(rustls::crypto::ring::default_provider()))
    }
}

impl fmt::Debug for CertificateValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateValidator")
            .field("key_provider", &self.provider.key_provider)
            .finish()
    }
}

fn parse_chain(cert_pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ValidationError> {
    let chain = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ValidationError::MalformedCertificatePem(e.to_string()))?;

    if chain.is_empty() {
        return Err(ValidationError::NoCertificate);
    }

    Ok(chain)
}

/// Parse every certificate as X.509 and return the leaf subject and expiry.
fn describe_chain(chain: &[CertificateDer<'_>]) -> Result<(String, String), ValidationError> {
    let mut leaf = None;

    for (index, der) in chain.iter().enumerate() {
        let (_, cert) = parse_x509_certificate(der.as_ref()).map_err(|e| {
            ValidationError::InvalidCertificate {
                index,
                reason: e.to_string(),
            }
        })?;

        if index == 0 {
            leaf = Some((
                cert.subject().to_string(),
                cert.validity().not_after.to_string(),
            ));
        }
    }

    leaf.ok_or(ValidationError::NoCertificate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::Fingerprint;
    use crate::testing::TestPair;

    #[test]
    fn test_valid_pair() {
        let fixture = TestPair::generate("valid.local");
        let pair = validate(fixture.cert_pem.as_bytes(), fixture.key_pem.as_bytes()).unwrap();

        assert_eq!(pair.chain().len(), 1);
        assert!(pair.subject().contains("valid.local"));
        assert_eq!(
            pair.fingerprint(),
            Fingerprint::of(fixture.cert_pem.as_bytes(), fixture.key_pem.as_bytes())
        );
    }

    #[test]
    fn test_chain_with_extra_certificate() {
        let leaf = TestPair::generate("leaf.local");
        let other = TestPair::generate("intermediate.local");
        let chain = format!("{}{}", leaf.cert_pem, other.cert_pem);

        let pair = validate(chain.as_bytes(), leaf.key_pem.as_bytes()).unwrap();
        assert_eq!(pair.chain().len(), 2);
        assert!(pair.subject().contains("leaf.local"));
    }

    #[test]
    fn test_garbage_certificate() {
        let fixture = TestPair::generate("garbage.local");
        let result = validate(b"this is not a certificate", fixture.key_pem.as_bytes());
        assert!(matches!(result, Err(ValidationError::NoCertificate)));
    }

    #[test]
    fn test_empty_certificate() {
        let fixture = TestPair::generate("empty.local");
        let result = validate(b"", fixture.key_pem.as_bytes());
        assert!(matches!(result, Err(ValidationError::NoCertificate)));
    }

    #[test]
    fn test_pem_wrapping_non_x509_bytes() {
        let fixture = TestPair::generate("bogus.local");
        let bogus = "-----BEGIN CERTIFICATE-----\naGVsbG8gd29ybGQ=\n-----END CERTIFICATE-----\n";
        let result = validate(bogus.as_bytes(), fixture.key_pem.as_bytes());
        assert!(matches!(
            result,
            Err(ValidationError::InvalidCertificate { index: 0, .. })
        ));
    }

    #[test]
    fn test_missing_key() {
        let fixture = TestPair::generate("nokey.local");
        let result = validate(fixture.cert_pem.as_bytes(), fixture.cert_pem.as_bytes());
        assert!(matches!(result, Err(ValidationError::NoPrivateKey)));
    }

    #[test]
    fn test_key_mismatch() {
        let a = TestPair::generate("a.local");
        let b = TestPair::generate("b.local");
        let result = validate(a.cert_pem.as_bytes(), b.key_pem.as_bytes());
        assert!(matches!(result, Err(ValidationError::KeyMismatch(_))));
    }
}
