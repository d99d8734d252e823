//! Error types for the Helix API client.

/// Errors that can occur while talking to the platform API.
#[derive(Debug, thiserror::Error)]
pub enum HelixError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("helix network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API rejected the credentials.
    #[error("helix rejected the credentials: {0}")]
    Unauthorized(String),

    /// The API answered with an unexpected status.
    #[error("helix returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}
