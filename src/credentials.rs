//! Short-lived session credentials for the realtime handshake.
//!
//! Two brokers are provided: one that asks the host application's token
//! route, and one that mints an ephemeral key directly from the realtime
//! sessions API with a long-lived API key.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// Opaque bearer credential for one session
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Reject tokens that expired before they could be used
    fn validated(self) -> Result<Self> {
        if self.value.is_empty() {
            return Err(SessionError::Handshake("broker returned an empty token".into()));
        }
        if self.is_expired(Utc::now()) {
            return Err(SessionError::Handshake("broker returned an expired token".into()));
        }
        Ok(self)
    }
}

// Never print the secret
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Issues a short-lived secret for a client session
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// Fails with `SessionError::Handshake`.
    async fn fetch_token(&self, session_id: &str) -> Result<SessionToken>;
}

fn from_unix(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

async fn error_body(response: reqwest::Response) -> SessionError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    SessionError::Handshake(format!("token request failed with {status}: {body}"))
}

// =============================================================================
// Host token route
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Fetches tokens from the host application's token route
///
/// POST `{"sessionId": ..}` -> `{"token": .., "expires_at": <unix seconds>}`
#[derive(Debug, Clone)]
pub struct HttpCredentialBroker {
    client: reqwest::Client,
    url: String,
}

impl HttpCredentialBroker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl CredentialBroker for HttpCredentialBroker {
    async fn fetch_token(&self, session_id: &str) -> Result<SessionToken> {
        if session_id.is_empty() {
            return Err(SessionError::Handshake("session id is required".into()));
        }

        debug!("Requesting session token from {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "sessionId": session_id }))
            .send()
            .await
            .map_err(|e| SessionError::Handshake(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Handshake(format!("invalid token response: {e}")))?;

        let token = SessionToken::new(body.token, from_unix(body.expires_at)).validated()?;
        info!("Session token issued for {}", session_id);
        Ok(token)
    }
}

// =============================================================================
// Realtime sessions API
// =============================================================================

#[derive(Debug, Deserialize)]
struct RealtimeSessionResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Mints ephemeral keys via `POST {base_url}/v1/realtime/sessions`
#[derive(Clone)]
pub struct OpenAiSessionBroker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiSessionBroker {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl CredentialBroker for OpenAiSessionBroker {
    async fn fetch_token(&self, session_id: &str) -> Result<SessionToken> {
        let url = format!("{}/v1/realtime/sessions", self.base_url);
        debug!("Creating realtime session for {} ({})", session_id, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "voice": self.voice }))
            .send()
            .await
            .map_err(|e| SessionError::Handshake(format!("session request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        let body: RealtimeSessionResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Handshake(format!("invalid session response: {e}")))?;

        let secret = body.client_secret;
        let token = SessionToken::new(secret.value, from_unix(secret.expires_at)).validated()?;
        info!("Ephemeral key issued for {}", session_id);
        Ok(token)
    }
}
