//! Certificate file watching
//!
//! Change triggers come from filesystem notifications on the parent
//! directories and from a periodic poll. Triggers are coalesced: after the
//! first one, further triggers are absorbed until the stream has been quiet
//! for `debounce` (or `max_delay` has passed since the first), and then both
//! files are read and hashed once. An event is emitted only when the combined
//! digest differs from the last one seen, so a `touch` or a rewrite with the
//! same bytes produces nothing.

use crate::config::ReloadSettings;
use crate::error::TransientReadError;
use crate::pair::Fingerprint;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The watched files changed content; re-check them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEvent;

/// Timing and trigger sources for a [`FileWatcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Fallback poll period
    pub poll_interval: Duration,

    /// Quiet period that closes a burst of triggers
    pub debounce: Duration,

    /// Subscribe to filesystem notifications
    pub notify: bool,
}

impl WatchOptions {
    /// Upper bound on how long a continuous trigger stream can postpone a
    /// content check
    pub fn max_delay(&self) -> Duration {
        self.debounce.saturating_mul(8)
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: crate::config::DEFAULT_POLL_INTERVAL,
            debounce: crate::config::DEFAULT_DEBOUNCE,
            notify: true,
        }
    }
}

impl From<&ReloadSettings> for WatchOptions {
    fn from(settings: &ReloadSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            debounce: settings.debounce,
            notify: settings.notify,
        }
    }
}

/// Feeds a trigger into a watcher, the same way a filesystem notification
/// does
#[derive(Debug, Clone)]
pub struct WatchTrigger(mpsc::UnboundedSender<()>);

impl WatchTrigger {
    /// Ask the watcher to re-check the files
    pub fn fire(&self) {
        let _ = self.0.send(());
    }
}

/// Watches a certificate file and a key file for content changes
#[derive(Debug)]
pub struct FileWatcher {
    cert_path: PathBuf,
    key_path: PathBuf,
    options: WatchOptions,
    baseline: Option<Fingerprint>,
    trigger_tx: mpsc::UnboundedSender<()>,
    trigger_rx: mpsc::UnboundedReceiver<()>,
}

impl FileWatcher {
    /// Create a watcher for the pair of paths
    pub fn new(
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        options: WatchOptions,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            options,
            baseline: None,
            trigger_tx,
            trigger_rx,
        }
    }

    /// Treat `fingerprint` as already seen instead of reading the files when
    /// watching starts
    pub fn with_baseline(mut self, fingerprint: Fingerprint) -> Self {
        self.baseline = Some(fingerprint);
        self
    }

    /// Handle for injecting triggers
    pub fn trigger_handle(&self) -> WatchTrigger {
        WatchTrigger(self.trigger_tx.clone())
    }

    /// Start watching. Events are produced lazily as the returned sequence
    /// is polled; the sequence ends once `cancel` fires.
    pub fn watch(self, cancel: CancellationToken) -> WatchEvents {
        let last = self.baseline.or_else(|| {
            read_pair(&self.cert_path, &self.key_path)
                .ok()
                .map(|(cert, key)| Fingerprint::of(&cert, &key))
        });

        let notifier = if self.options.notify {
            match subscribe(&self.cert_path, &self.key_path, self.trigger_tx.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "Filesystem notifications unavailable, relying on polling");
                    None
                }
            }
        } else {
            None
        };

        let period = self.options.poll_interval.max(MIN_POLL_INTERVAL);
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            cert_file = %self.cert_path.display(),
            key_file = %self.key_path.display(),
            poll_interval = ?self.options.poll_interval,
            debounce = ?self.options.debounce,
            notify = notifier.is_some(),
            "Certificate watcher started"
        );

        WatchEvents {
            cert_path: self.cert_path,
            key_path: self.key_path,
            options: self.options,
            last,
            poll,
            triggers: self.trigger_rx,
            _trigger_tx: self.trigger_tx,
            _notifier: notifier,
            cancel,
        }
    }
}

/// Lazy sequence of [`WatchEvent`]s
#[derive(Debug)]
pub struct WatchEvents {
    cert_path: PathBuf,
    key_path: PathBuf,
    options: WatchOptions,
    last: Option<Fingerprint>,
    poll: Interval,
    triggers: mpsc::UnboundedReceiver<()>,
    // keeps `triggers` open when no notifier or handle is alive
    _trigger_tx: mpsc::UnboundedSender<()>,
    _notifier: Option<RecommendedWatcher>,
    cancel: CancellationToken,
}

impl WatchEvents {
    /// Wait for the next content change. Returns `None` after cancellation.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = self.triggers.recv() => debug!("Certificate change notification"),
                _ = self.poll.tick() => debug!("Certificate poll tick"),
            }

            if !self.coalesce().await {
                return None;
            }

            if self.check() {
                return Some(WatchEvent);
            }
        }
    }

    /// Reset the digest that later reads are compared against.
    ///
    /// Called with whatever the consumer actually acted on, so content it
    /// never managed to apply is reported again.
    pub fn rebase(&mut self, fingerprint: Fingerprint) {
        if self.last != Some(fingerprint) {
            debug!(fingerprint = %fingerprint.short(), "Certificate watcher rebased");
        }
        self.last = Some(fingerprint);
    }

    /// Absorb triggers until quiet. Returns false if cancelled meanwhile.
    async fn coalesce(&mut self) -> bool {
        let deadline = Instant::now() + self.options.max_delay();
        let mut absorbed = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(deadline) => break,
                _ = tokio::time::sleep(self.options.debounce) => break,
                _ = self.triggers.recv() => absorbed += 1,
            }
        }

        if absorbed > 0 {
            debug!(absorbed, "Coalesced certificate change notifications");
        }
        true
    }

    /// Hash both files and compare with the last digest seen
    fn check(&mut self) -> bool {
        let (cert, key) = match read_pair(&self.cert_path, &self.key_path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "Certificate files unreadable, keeping current certificate");
                return false;
            }
        };

        let digest = Fingerprint::of(&cert, &key);
        if self.last == Some(digest) {
            debug!(fingerprint = %digest.short(), "Certificate files unchanged");
            return false;
        }

        debug!(fingerprint = %digest.short(), "Certificate files changed");
        self.last = Some(digest);
        true
    }
}

/// Read the certificate and key files
pub(crate) fn read_pair(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<u8>, Vec<u8>), TransientReadError> {
    let cert = std::fs::read(cert_path).map_err(|e| TransientReadError::new(cert_path, e))?;
    let key = std::fs::read(key_path).map_err(|e| TransientReadError::new(key_path, e))?;
    Ok((cert, key))
}

/// Watch the parent directories so rename and symlink swaps are seen
fn subscribe(
    cert_path: &Path,
    key_path: &Path,
    tx: mpsc::UnboundedSender<()>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&event) => {
            let _ = tx.send(());
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "File watcher error"),
    })?;

    let mut dirs: Vec<&Path> = Vec::with_capacity(2);
    for path in [cert_path, key_path] {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    for dir in dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }

    Ok(watcher)
}

fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}
