//! Error types for the remote migration transport.

use thiserror::Error;

/// Errors that can occur while pushing a migration to the control plane.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        message: String,
    },

    /// The upload target echoed a different ETag than was submitted.
    #[error("etag mismatch after upload: sent {expected}, got {actual}")]
    EtagMismatch {
        /// ETag computed over the SQL body.
        expected: String,
        /// ETag the upload target returned.
        actual: String,
    },

    /// A response was missing a field the handshake requires.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The ingest job did not complete within the polling budget.
    #[error("migration did not complete after {0} status checks")]
    Timeout(usize),
}

/// Convenience alias for results with [`RemoteError`].
pub type Result<T> = std::result::Result<T, RemoteError>;
