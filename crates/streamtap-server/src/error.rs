use streamtap_chat::ChatError;
use streamtap_helix::HelixError;
use streamtap_push::PushError;
use thiserror::Error;

/// Setup errors escaping [`Streamtap`](crate::Streamtap).
#[derive(Debug, Error)]
pub enum StreamtapError {
    #[error("channel.name is not configured")]
    MissingChannel,

    #[error("chat connection failed: {0}")]
    Chat(#[from] ChatError),

    #[error("push notifications failed: {0}")]
    Push(#[from] PushError),
}

/// Why a donation-socket message was dropped.
#[derive(Debug, Error)]
pub enum DonationError {
    #[error("malformed message: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("couldn't get the viewer named {0}")]
    UnknownViewer(String),

    #[error("viewer lookup failed: {0}")]
    Lookup(#[from] HelixError),
}
