//! Records returned by the platform API and the collaborator traits
//! producers consume.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HelixError;

/// A platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    /// Stable numeric id, as a string.
    pub id: String,
    /// Lowercase login.
    pub login: String,
    /// Display name as shown in chat.
    pub display_name: String,
}

/// Current broadcast metadata of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub broadcaster_id: String,
    #[serde(rename = "game_id")]
    pub category_id: String,
    #[serde(rename = "game_name")]
    pub category_name: String,
    pub title: String,
}

/// Resolves names and ids to viewers.
///
/// `Ok(None)` means the lookup succeeded but no such account exists.
#[async_trait]
pub trait ViewerResolver: Send + Sync {
    async fn viewer_by_name(&self, name: &str) -> Result<Option<Viewer>, HelixError>;

    async fn viewer_by_id(&self, id: &str) -> Result<Option<Viewer>, HelixError>;
}

/// Fetches channel snapshots.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn channel_info(&self, broadcaster_id: &str) -> Result<Option<ChannelInfo>, HelixError>;
}

/// Supplies the credentials outbound API calls are signed with.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The application client id sent alongside the bearer token.
    fn client_id(&self) -> &str;

    /// A currently valid bearer token.
    async fn access_token(&self) -> Result<String, HelixError>;
}
