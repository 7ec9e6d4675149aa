//! Turns watch events into add/update/delete changes

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::watcher::Event;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Namespace and name of a secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretRef {
    /// Namespace, absent for objects without one
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl SecretRef {
    fn of(secret: &Secret) -> Self {
        Self {
            namespace: secret.metadata.namespace.clone(),
            name: secret.metadata.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A change to the set of secrets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretChange {
    /// Seen for the first time
    Added(SecretRef),
    /// Known secret with a new resource version
    Updated(SecretRef),
    /// Removed, or missing from a relist
    Deleted(SecretRef),
}

/// Remembers which secrets exist so that watch events can be classified.
///
/// The watcher only distinguishes "applied" from "deleted". Whether an
/// applied object is new or changed comes from the known set, and a relist
/// (after a watch restart) reports objects that did not come back as
/// deleted. Re-applying an object with the same resource version is not a
/// change.
#[derive(Debug, Default)]
pub struct SecretTracker {
    known: HashMap<SecretRef, Option<String>>,
    relist: Option<HashSet<SecretRef>>,
}

impl SecretTracker {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of secrets currently known
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Whether no secret is known
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Feed one watch event
    pub fn observe(&mut self, event: Event<Secret>) -> Vec<SecretChange> {
        match event {
            Event::Init => {
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(secret) => {
                let key = SecretRef::of(&secret);
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(key.clone());
                }
                self.apply(key, &secret).into_iter().collect()
            }
            Event::InitDone => {
                let Some(seen) = self.relist.take() else {
                    return Vec::new();
                };
                let mut gone: Vec<SecretRef> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                gone.sort();
                for key in &gone {
                    self.known.remove(key);
                }
                gone.into_iter().map(SecretChange::Deleted).collect()
            }
            Event::Apply(secret) => {
                let key = SecretRef::of(&secret);
                self.apply(key, &secret).into_iter().collect()
            }
            Event::Delete(secret) => {
                let key = SecretRef::of(&secret);
                self.known.remove(&key);
                vec![SecretChange::Deleted(key)]
            }
        }
    }

    fn apply(&mut self, key: SecretRef, secret: &Secret) -> Option<SecretChange> {
        let version = secret.metadata.resource_version.clone();
        match self.known.insert(key.clone(), version.clone()) {
            None => Some(SecretChange::Added(key)),
            Some(previous) if previous != version => Some(SecretChange::Updated(key)),
            Some(_) => None,
        }
    }
}
