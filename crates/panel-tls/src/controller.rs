//! Certificate reload controller
//!
//! Loads the initial pair at startup, then re-reads and validates the files
//! each time the watcher reports a change. A valid candidate replaces the
//! active pair; an invalid or unreadable one is logged and dropped, and the
//! previous pair stays in service.

use crate::config::ReloadSettings;
use crate::error::{InitialLoadError, TransientReadError, ValidationError};
use crate::holder::ActiveCertificateState;
use crate::pair::Fingerprint;
use crate::validator::CertificateValidator;
use crate::watcher::{read_pair, FileWatcher, WatchEvents, WatchOptions};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of a single reload attempt
#[derive(Debug)]
pub enum ReloadOutcome {
    /// A new pair is now active
    Reloaded(Fingerprint),

    /// Files hold the pair already active
    Unchanged,

    /// Candidate rejected, previous pair retained
    Rejected(ValidationError),

    /// A file could not be read, previous pair retained
    ReadFailed(TransientReadError),
}

impl ReloadOutcome {
    /// Whether the active pair changed
    pub fn is_reloaded(&self) -> bool {
        matches!(self, Self::Reloaded(_))
    }
}

/// Controller status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerStatus {
    /// Serving the pair currently on disk
    Running,

    /// The last candidate was rejected; the previous pair is still served
    ReloadRejected,
}

/// Reload counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadStats {
    /// Reload attempts
    pub attempts: u64,
    /// Attempts that published a new pair
    pub reloads: u64,
    /// Attempts rejected by validation
    pub rejections: u64,
    /// Attempts that failed to read a file
    pub read_failures: u64,
}

#[derive(Debug)]
struct Shared {
    state: Arc<ActiveCertificateState>,
    attempts: AtomicU64,
    reloads: AtomicU64,
    rejections: AtomicU64,
    read_failures: AtomicU64,
    rejected: AtomicBool,
}

/// Read-only view of a running controller
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    shared: Arc<Shared>,
}

impl ReloadHandle {
    /// Active certificate slot
    pub fn state(&self) -> Arc<ActiveCertificateState> {
        Arc::clone(&self.shared.state)
    }

    /// Current status
    pub fn status(&self) -> ControllerStatus {
        if self.shared.rejected.load(Ordering::Acquire) {
            ControllerStatus::ReloadRejected
        } else {
            ControllerStatus::Running
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            attempts: self.shared.attempts.load(Ordering::Relaxed),
            reloads: self.shared.reloads.load(Ordering::Relaxed),
            rejections: self.shared.rejections.load(Ordering::Relaxed),
            read_failures: self.shared.read_failures.load(Ordering::Relaxed),
        }
    }
}

/// Owns the write side of the active certificate slot
#[derive(Debug)]
pub struct ReloadController {
    settings: ReloadSettings,
    validator: CertificateValidator,
    handle: ReloadHandle,
}

impl ReloadController {
    /// Load and validate the initial pair
    pub fn initialize(settings: ReloadSettings) -> Result<Self, InitialLoadError> {
        Self::with_validator(settings, CertificateValidator::default())
    }

    /// Same as [`initialize`](Self::initialize) with a specific validator
    pub fn with_validator(
        settings: ReloadSettings,
        validator: CertificateValidator,
    ) -> Result<Self, InitialLoadError> {
        let (cert, key) = read_pair(&settings.cert_file, &settings.key_file)?;
        let pair = validator.validate(&cert, &key)?;

        info!(
            cert_file = %settings.cert_file.display(),
            key_file = %settings.key_file.display(),
            fingerprint = %pair.fingerprint().short(),
            subject = %pair.subject(),
            not_after = %pair.not_after(),
            "Loaded TLS certificate"
        );

        let shared = Shared {
            state: Arc::new(ActiveCertificateState::new(pair)),
            attempts: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            rejected: AtomicBool::new(false),
        };

        Ok(Self {
            settings,
            validator,
            handle: ReloadHandle {
                shared: Arc::new(shared),
            },
        })
    }

    /// Settings the controller was built with
    pub fn settings(&self) -> &ReloadSettings {
        &self.settings
    }

    /// Active certificate slot, for the TLS config provider
    pub fn state(&self) -> Arc<ActiveCertificateState> {
        self.handle.state()
    }

    /// Status and counters view that outlives [`run`](Self::run)
    pub fn handle(&self) -> ReloadHandle {
        self.handle.clone()
    }

    /// Whether the last reload attempt was rejected
    pub fn status(&self) -> ControllerStatus {
        self.handle.status()
    }

    /// Reload counters so far
    pub fn stats(&self) -> ReloadStats {
        self.handle.stats()
    }

    /// Watcher over the configured files, primed with the active fingerprint
    pub fn watcher(&self) -> FileWatcher {
        FileWatcher::new(
            &self.settings.cert_file,
            &self.settings.key_file,
            WatchOptions::from(&self.settings),
        )
        .with_baseline(self.handle.shared.state.fingerprint())
    }

    /// Re-read both files and publish them if they form a new valid pair
    pub fn reload_once(&self) -> ReloadOutcome {
        self.attempt().0
    }

    /// Reload for one watcher event, then rebase the watcher on the
    /// content this attempt settled on
    pub fn apply_event(&self, events: &mut WatchEvents) -> ReloadOutcome {
        let (outcome, observed) = self.attempt();
        events.rebase(observed);
        outcome
    }

    /// One reload attempt, plus the digest later changes are measured from.
    ///
    /// Failed reads leave the active pair as the reference so the same
    /// content is retried once it becomes readable. Rejected content is
    /// remembered so it is not validated again until it changes.
    fn attempt(&self) -> (ReloadOutcome, Fingerprint) {
        let shared = &self.handle.shared;
        shared.attempts.fetch_add(1, Ordering::Relaxed);
        let current = shared.state.fingerprint();

        let (cert, key) = match read_pair(&self.settings.cert_file, &self.settings.key_file) {
            Ok(contents) => contents,
            Err(e) => {
                shared.read_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Unable to read certificate files, keeping current certificate");
                return (ReloadOutcome::ReadFailed(e), current);
            }
        };

        let candidate = Fingerprint::of(&cert, &key);
        if candidate == current {
            shared.rejected.store(false, Ordering::Release);
            debug!(fingerprint = %current.short(), "Certificate unchanged");
            return (ReloadOutcome::Unchanged, current);
        }

        let pair = match self.validator.validate(&cert, &key) {
            Ok(pair) => pair,
            Err(e) => {
                shared.rejections.fetch_add(1, Ordering::Relaxed);
                shared.rejected.store(true, Ordering::Release);
                error!(
                    reason = %e,
                    current = %current.short(),
                    candidate = %candidate.short(),
                    "Rejected new TLS certificate, keeping current certificate"
                );
                return (ReloadOutcome::Rejected(e), candidate);
            }
        };

        let fingerprint = pair.fingerprint();
        info!(
            fingerprint = %fingerprint.short(),
            previous = %current.short(),
            subject = %pair.subject(),
            not_after = %pair.not_after(),
            "Reloaded TLS certificate"
        );

        shared.state.store(pair);
        shared.reloads.fetch_add(1, Ordering::Relaxed);
        shared.rejected.store(false, Ordering::Release);

        (ReloadOutcome::Reloaded(fingerprint), fingerprint)
    }

    /// Watch the files and reload on every change until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let watcher = self.watcher();
        self.run_with(watcher, cancel).await;
    }

    /// Run driven by a specific watcher
    pub async fn run_with(self, watcher: FileWatcher, cancel: CancellationToken) {
        let mut events = watcher.watch(cancel);

        while events.recv().await.is_some() {
            self.apply_event(&mut events);
        }

        info!(stats = ?self.handle.stats(), "Certificate reload controller stopped");
    }
}
