//! # Panel Secrets
//!
//! Background watch over Kubernetes `Secret` objects. It only logs what it
//! sees (added, updated, deleted); nothing else in the backend depends on it.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod tracker;
pub mod watcher;

pub use tracker::{SecretChange, SecretRef, SecretTracker};
pub use watcher::SecretWatcher;
