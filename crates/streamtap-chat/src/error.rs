//! Error types for the chat connection and producer.

use streamtap_helix::HelixError;

/// Errors raised by a [`ChatConnection`](crate::ChatConnection).
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The websocket transport failed.
    #[error("chat transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server refused the login.
    #[error("chat login refused: {0}")]
    LoginRefused(String),

    /// The operation needs an open connection.
    #[error("chat connection is not open")]
    NotConnected,
}

/// Reasons a single raw chat message is dropped instead of emitted.
///
/// These never escape the producer: each one becomes an `error` log event.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The viewer lookup failed.
    #[error("viewer lookup failed: {0}")]
    Lookup(#[from] HelixError),

    /// The viewer lookup succeeded but found nobody.
    #[error("couldn't get the viewer named {0}")]
    UnknownViewer(String),

    /// A numeric field did not parse.
    #[error("{field} was not a valid number: {value:?}")]
    InvalidNumber {
        /// Raw protocol field name.
        field: &'static str,
        /// Raw value as received.
        value: String,
    },

    /// The subscription plan is not a known tier.
    #[error("unknown subscription plan: {0}")]
    UnknownPlan(String),
}
