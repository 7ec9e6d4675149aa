//! # Panel Core
//!
//! Core types and error handling for the console plugin backend.
//!
//! This crate provides the foundational pieces shared by the other crates:
//! - Error types
//! - Feature flags
//! - Plugin configuration served to the console

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FeatureFlags, PluginConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{FeatureFlags, PluginConfig};
}
