//! Error types for the `dx-model` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors from the outbound chat-completions call.
///
/// Callers on the request path collapse every variant into an empty diagnosis
/// list; the variants exist so the failure stage can be logged.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The request could not be sent or the connection failed
    #[error("Request failed: {0}")]
    Request(String),

    /// The request exceeded the configured timeout
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The endpoint answered with a non-success status
    #[error("Model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not contain `choices[0].message.content`
    #[error("Malformed completion envelope: {0}")]
    Envelope(String),
}

/// A convenience result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
