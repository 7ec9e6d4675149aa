//! Error types for the plugin backend

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the plugin backend
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS setup or certificate error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Kubernetes client or watch error
    #[error("Kubernetes error: {0}")]
    Kubernetes(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}
