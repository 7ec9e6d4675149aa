//! # Panel Runtime
//!
//! Serves the console plugin over HTTP or HTTPS:
//! - Plugin assets, manifest, feature flags and plugin configuration routes
//! - Hot certificate reload when TLS is enabled
//! - Background secret watch
//! - Graceful shutdown with signal handling

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod routes;
pub mod server;
pub mod shutdown;

pub use routes::{build_router, AppState, RouterOptions};
pub use server::{Server, ServerBuilder};
pub use shutdown::{ShutdownSignal, SignalHandler};

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Server is initializing
    Initializing,
    /// Server is running
    Running,
    /// Server is shutting down
    ShuttingDown,
    /// Server is stopped
    Stopped,
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::server::{Server, ServerBuilder};
    pub use crate::shutdown::{ShutdownSignal, SignalHandler};
    pub use crate::RuntimeState;
}
