//! Outbound subscribe/unsubscribe requests to the push hub.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use streamtap_helix::CredentialProvider;

use crate::error::HubError;

pub const DEFAULT_HUB_URL: &str = "https://api.twitch.tv/helix/webhooks/hub";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for HubMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the hub.
#[derive(Clone, PartialEq, Eq)]
pub struct HubRequest {
    /// Full callback URL, ending with the subscription id.
    pub callback: String,
    pub mode: HubMode,
    pub topic: String,
    pub lease_seconds: u64,
    pub secret: String,
}

impl fmt::Debug for HubRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubRequest")
            .field("callback", &self.callback)
            .field("mode", &self.mode)
            .field("topic", &self.topic)
            .field("lease_seconds", &self.lease_seconds)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Sends signed requests to the push hub.
#[async_trait]
pub trait HubClient: Send + Sync {
    async fn send(&self, request: &HubRequest) -> Result<(), HubError>;
}

/// [`HubClient`] posting JSON to the platform hub with a bearer token.
pub struct HelixHub {
    http: reqwest::Client,
    hub_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HelixHub {
    pub fn new(hub_url: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            hub_url: hub_url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl HubClient for HelixHub {
    async fn send(&self, request: &HubRequest) -> Result<(), HubError> {
        let token = self.credentials.access_token().await?;
        let resp = self
            .http
            .post(&self.hub_url)
            .bearer_auth(token)
            .header("Client-Id", self.credentials.client_id())
            .json(&json!({
                "hub.callback": request.callback,
                "hub.mode": request.mode.as_str(),
                "hub.topic": request.topic,
                "hub.lease_seconds": request.lease_seconds,
                "hub.secret": request.secret,
            }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(mode = %request.mode, topic = %request.topic, "hub accepted request");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        // 403: the channel did not authorize us. A 401 is our own credential.
        if status == StatusCode::FORBIDDEN {
            return Err(HubError::Rejected(body));
        }
        Err(HubError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
