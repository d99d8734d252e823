use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ChatError;
use crate::message::ChatMessage;

/// Lifecycle of a chat connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// A persistent chat-protocol connection.
///
/// Implementations deliver every parsed notification through
/// [`messages`](ChatConnection::messages); the producer decides which ones
/// become canonical events.
#[async_trait]
pub trait ChatConnection: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Opens the connection and joins the configured channel.
    async fn connect(&self) -> Result<(), ChatError>;

    /// Closes the connection. Closing a closed connection is a no-op.
    async fn disconnect(&self) -> Result<(), ChatError>;

    /// Logins holding moderator rights in `channel`, as far as this
    /// connection can observe them.
    async fn moderators(&self, channel: &str) -> Result<Vec<String>, ChatError>;

    /// A receiver of every message parsed from now on.
    fn messages(&self) -> broadcast::Receiver<ChatMessage>;
}
