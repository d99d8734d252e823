//! Error types for the push-subscription manager and producer.

use streamtap_helix::HelixError;

/// Errors raised by a [`HubClient`](crate::HubClient) request.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// No bearer credential could be obtained.
    #[error("hub credentials unavailable: {0}")]
    Credentials(#[from] HelixError),

    /// The hub refused the subscription for lack of authorization.
    #[error("hub rejected the request: {0}")]
    Rejected(String),

    #[error("hub responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

impl HubError {
    /// Whether the hub refused the request because the target channel did
    /// not authorize the client. This is an expected configuration outcome.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Setup errors of the push producer.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("invalid callback url {url:?}: {source}")]
    InvalidCallbackUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("channel {0:?} not found")]
    ChannelNotFound(String),

    #[error("channel lookup failed: {0}")]
    Lookup(#[from] HelixError),

    #[error("failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons an inbound notification produces no event.
///
/// These never escape the producer: each one becomes an `error` log event.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification carried no data")]
    MissingPayload,

    #[error("malformed notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("notification is missing {0}")]
    MissingField(&'static str),

    #[error("unknown subscription tier: {0}")]
    UnknownTier(String),

    #[error("channel lookup failed: {0}")]
    Lookup(#[from] HelixError),

    #[error("channel {0} has no broadcast information")]
    ChannelUnavailable(String),
}
