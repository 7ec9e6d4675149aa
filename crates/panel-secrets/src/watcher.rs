//! Kubernetes secret watch

use crate::tracker::{SecretChange, SecretTracker};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{watcher, watcher::Config as WatcherConfig, WatchStreamExt},
    Api, Client,
};
use panel_config::SecretWatchConfig;
use panel_core::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Logs secret add/update/delete events
#[derive(Clone)]
pub struct SecretWatcher {
    client: Client,
    namespace: Option<String>,
}

impl std::fmt::Debug for SecretWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretWatcher")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl SecretWatcher {
    /// Connect using the in-cluster or kubeconfig credentials
    pub async fn new(config: &SecretWatchConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Kubernetes(format!("Failed to create Kubernetes client: {e}")))?;

        Ok(Self::with_client(client, config.namespace.clone()))
    }

    /// Use an existing client
    pub fn with_client(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    /// Namespace filter, `None` for all namespaces
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Watch until cancelled. Stream errors are logged and the watch
    /// resumes after a backoff.
    pub async fn run(self, cancel: CancellationToken) {
        let secrets: Api<Secret> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        info!(
            namespace = self.namespace.as_deref().unwrap_or("<all>"),
            "Starting Kubernetes secret watch"
        );

        let mut stream = watcher(secrets, WatcherConfig::default())
            .default_backoff()
            .boxed();
        let mut tracker = SecretTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        for change in tracker.observe(event) {
                            log_change(&change);
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "Secret watch error"),
                    None => {
                        debug!("Secret watch stream ended");
                        break;
                    }
                },
            }
        }

        info!(known = tracker.len(), "Kubernetes secret watch stopped");
    }
}

fn log_change(change: &SecretChange) {
    match change {
        SecretChange::Added(secret) => info!(
            name = %secret.name,
            namespace = secret.namespace.as_deref().unwrap_or(""),
            "Secret added"
        ),
        SecretChange::Updated(secret) => info!(
            name = %secret.name,
            namespace = secret.namespace.as_deref().unwrap_or(""),
            "Secret updated"
        ),
        SecretChange::Deleted(secret) => info!(
            name = %secret.name,
            namespace = secret.namespace.as_deref().unwrap_or(""),
            "Secret deleted"
        ),
    }
}
