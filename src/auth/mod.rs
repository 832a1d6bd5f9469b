//! Access token handling
//!
//! Provides token refresh through a trait-based design:
//! - `TokenProvider` trait defines the refresh seam
//! - `ClientCredentials` exchanges a clientID/clientSecret pair for a token
//! - `StaticToken` hands out a fixed token (tests, externally managed tokens)
//!
//! The API client holds the current token and calls back into the configured
//! provider when the service reports an expired authorization, so no token
//! state lives in process-wide globals.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token acquisition errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),
}

/// A bearer token for the open API, with its expiry when known.
#[derive(Debug, Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Create a token with a known expiry
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Create a token without expiry information
    pub fn perpetual(secret: impl Into<String>) -> Self {
        Self::new(secret, None)
    }

    /// The raw bearer secret
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Consume the token, returning the bearer secret
    pub fn into_secret(self) -> String {
        self.secret
    }

    /// Whether the token is known to be past its expiry.
    ///
    /// Tokens without expiry information never report expired; the server
    /// remains the authority either way.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Trait for token providers
///
/// Implement this to plug a custom refresh mechanism into the API client.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a fresh access token
    async fn refresh(&self) -> Result<AccessToken, AuthError>;
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    #[serde(rename = "clientID")]
    client_id: &'a str,
    #[serde(rename = "clientSecret")]
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expiredAt", default)]
    expired_at: Option<String>,
}

/// Client-credentials provider
///
/// Posts the clientID/clientSecret pair to the access-token endpoint and
/// parses `{accessToken, expiredAt}` out of the response envelope.
pub struct ClientCredentials {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    /// Create a new client-credentials provider
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    #[tracing::instrument(name = "auth.refresh", skip(self), err)]
    async fn refresh(&self) -> Result<AccessToken, AuthError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AuthError::MissingCredentials(
                "clientID/clientSecret empty".into(),
            ));
        }

        let url = format!("{}/api/v1/access_token", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Platform", crate::api::PLATFORM)
            .header(reqwest::header::USER_AGENT, crate::api::USER_AGENT)
            .json(&TokenRequest {
                client_id: &self.client_id,
                client_secret: &self.client_secret,
            })
            .send()
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;

        let data = crate::api::read_envelope(response)
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;
        let parsed: TokenResponse = serde_json::from_value(data)
            .map_err(|e| AuthError::Refresh(format!("malformed access_token response: {e}")))?;

        let expires_at = parsed
            .expired_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc));

        tracing::info!(expires_at = ?expires_at, "Access token refreshed");

        Ok(AccessToken::new(parsed.access_token, expires_at))
    }
}

/// Static token provider
///
/// Always hands out the same token. Useful for tests or when refresh is
/// managed outside the process.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: AccessToken,
}

impl StaticToken {
    /// Create a new static token provider
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: AccessToken::perpetual(secret),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn refresh(&self) -> Result<AccessToken, AuthError> {
        Ok(self.token.clone())
    }
}
