//! Error taxonomy of the client layer.

use vacal_core::error::CoreError;

/// Failure talking to the task service.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, connection, body read).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Task service error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The base URL could not carry a task path.
    #[error("Invalid task service URL {0}")]
    InvalidUrl(String),

    /// The response body was not the JSON we expected.
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors surfaced by one-shot client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation was deliberately aborted by its owner. Never shown
    /// to the user as a failure.
    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
