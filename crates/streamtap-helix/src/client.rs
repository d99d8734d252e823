//! reqwest-backed client for the platform API using an app access token.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::HelixError;
use crate::login::normalize_login;
use crate::types::{ChannelDirectory, ChannelInfo, CredentialProvider, Viewer, ViewerResolver};

pub const DEFAULT_API_URL: &str = "https://api.twitch.tv/helix";
pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// HTTP request timeout for API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens are refreshed this long before the advertised expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Platform API client authenticated with the client-credentials flow.
///
/// The app access token is fetched lazily and cached until shortly before it
/// expires. A `401` from the API drops the cached token and retries once.
pub struct HelixClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    api_url: String,
    token_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for HelixClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelixClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl HelixClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_urls(client_id, client_secret, DEFAULT_API_URL, DEFAULT_TOKEN_URL)
    }

    /// Creates a client talking to non-default endpoints.
    pub fn with_urls(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            token: Mutex::new(None),
        }
    }

    async fn fetch_token(&self) -> Result<CachedToken, HelixError> {
        let resp = self
            .http
            .post(&self.token_url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            let body = resp.text().await.unwrap_or_default();
            return Err(HelixError::Unauthorized(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HelixError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        tracing::debug!(expires_in = token.expires_in, "fetched app access token");
        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, HelixError> {
        let url = format!("{}/{}", self.api_url, path);
        let mut retried = false;
        loop {
            let token = self.access_token().await?;
            let resp = self
                .http
                .get(&url)
                .query(query)
                .bearer_auth(&token)
                .header("Client-Id", &self.client_id)
                .send()
                .await?;

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
                if !retried {
                    retried = true;
                    continue;
                }
                let body = resp.text().await.unwrap_or_default();
                return Err(HelixError::Unauthorized(body));
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(HelixError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let payload: DataResponse<T> = resp.json().await?;
            return Ok(payload.data);
        }
    }
}

#[async_trait]
impl CredentialProvider for HelixClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn access_token(&self) -> Result<String, HelixError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }
        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }
}

#[async_trait]
impl ViewerResolver for HelixClient {
    async fn viewer_by_name(&self, name: &str) -> Result<Option<Viewer>, HelixError> {
        let login = normalize_login(name);
        if login.is_empty() {
            return Ok(None);
        }
        let users: Vec<Viewer> = self.get_data("users", &[("login", login.as_str())]).await?;
        Ok(users.into_iter().next())
    }

    async fn viewer_by_id(&self, id: &str) -> Result<Option<Viewer>, HelixError> {
        if id.is_empty() {
            return Ok(None);
        }
        let users: Vec<Viewer> = self.get_data("users", &[("id", id)]).await?;
        Ok(users.into_iter().next())
    }
}

#[async_trait]
impl ChannelDirectory for HelixClient {
    async fn channel_info(&self, broadcaster_id: &str) -> Result<Option<ChannelInfo>, HelixError> {
        let channels: Vec<ChannelInfo> = self
            .get_data("channels", &[("broadcaster_id", broadcaster_id)])
            .await?;
        Ok(channels.into_iter().next())
    }
}
