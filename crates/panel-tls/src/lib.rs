//! TLS termination for the plugin backend
//!
//! Serves a single certificate/key pair loaded from PEM files and swaps it
//! at runtime when the files change on disk:
//! - Content-based change detection with burst coalescing
//! - Validation before publish (X.509 parse, supported key, key matches certificate)
//! - Lock-free certificate snapshot read on every handshake
//! - TLS 1.2 minimum, optionally TLS 1.3 only
//!
//! A rejected candidate never replaces the active pair; the last good
//! certificate keeps being served until a valid pair shows up.
//!
//! ```ignore
//! let controller = ReloadController::initialize(ReloadSettings::new(cert, key))?;
//! let provider = TlsConfigProvider::new(controller.state(), MinTlsVersion::Tls12);
//! let acceptor = TlsAcceptor::new(provider)?;
//! tokio::spawn(controller.run(cancel.child_token()));
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod acceptor;
pub mod config;
pub mod controller;
pub mod error;
pub mod holder;
pub mod pair;
pub mod provider;
pub mod validator;
pub mod watcher;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use acceptor::TlsAcceptor;
pub use config::{MinTlsVersion, ReloadSettings};
pub use controller::{ControllerStatus, ReloadController, ReloadHandle, ReloadOutcome, ReloadStats};
pub use error::{InitialLoadError, TlsError, TransientReadError, ValidationError};
pub use holder::ActiveCertificateState;
pub use pair::{CertificateKeyPair, Fingerprint};
pub use provider::{CertificateSource, TlsConfigProvider};
pub use validator::{validate, CertificateValidator};
pub use watcher::{FileWatcher, WatchEvent, WatchEvents, WatchOptions, WatchTrigger};
