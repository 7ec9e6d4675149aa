//! Active certificate slot

use crate::pair::{CertificateKeyPair, Fingerprint};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// The certificate/key pair currently served.
///
/// Written by the reload controller, read on every handshake. Reads take a
/// lock-free snapshot: a reader sees either the old pair or the new pair in
/// full, and a snapshot stays valid after a later [`store`](Self::store).
/// The slot is built from the initial pair, so it is never empty.
#[derive(Debug)]
pub struct ActiveCertificateState {
    current: ArcSwap<CertificateKeyPair>,
}

impl ActiveCertificateState {
    /// Create the slot holding the initial pair
    pub fn new(initial: CertificateKeyPair) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Snapshot of the active pair
    pub fn load(&self) -> Arc<CertificateKeyPair> {
        self.current.load_full()
    }

    /// Publish a new pair, returning the one it replaced
    pub fn store(&self, pair: CertificateKeyPair) -> Arc<CertificateKeyPair> {
        self.current.swap(Arc::new(pair))
    }

    /// Fingerprint of the active pair
    pub fn fingerprint(&self) -> Fingerprint {
        self.current.load().fingerprint()
    }
}
