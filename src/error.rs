//! Error types for the table-mirror client.

use thiserror::Error;

/// Errors surfaced by the mirror and its transports.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Client was misconfigured (bad URL, missing required option).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Authentication was rejected or credentials are missing.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Underlying HTTP transport failure.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// WebSocket transport failure on the change feed.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// JSON payload could not be serialized or parsed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// An operation did not complete within its configured window.
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// A row payload was missing a required field (typically `id`).
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// Internal invariant failure (poisoned lock, closed channel).
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, MirrorError>;
