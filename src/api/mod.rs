//! API client module
//!
//! Provides the generic call layer against the open API: one authenticated
//! JSON request/response cycle per call, with envelope decoding and a
//! single refresh-and-retry pass when the service reports an expired
//! authorization.
//!
//! Two operations are exposed to the rest of the crate:
//!
//! - [`ApiClient::call_api`] — an enveloped JSON call against a service
//!   endpoint, decoded into a typed payload.
//! - [`ApiClient::raw_transfer`] — one plain request against a
//!   caller-supplied URL, used for presigned chunk upload targets. The
//!   response body is never interpreted; only the status code matters.
//!
//! # Example
//!
//! ```no_run
//! use kappa_pan::api::ApiClient;
//! use kappa_pan::config::ApiConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ApiConfig {
//!     access_token: Some("token".to_string()),
//!     ..ApiConfig::default()
//! };
//! let client = ApiClient::from_config(&config)?;
//! # Ok(())
//! # }
//! ```

use crate::auth::{AccessToken, AuthError, ClientCredentials, TokenProvider};
use crate::config::ApiConfig;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Platform header value required on every API request
pub(crate) const PLATFORM: &str = "open_platform";

/// User-Agent sent on every request
pub(crate) const USER_AGENT: &str = concat!("kappa-pan/", env!("CARGO_PKG_VERSION"));

/// Trace id reported when the envelope carries none
const NO_TRACE_ID: &str = "no_trace_id";

/// API client errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service error [{code}]({trace_id}): {message}")]
    Service {
        code: i64,
        message: String,
        trace_id: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Whether the service rejected the call for an expired or invalid
    /// authorization.
    pub fn is_expired_auth(&self) -> bool {
        matches!(self, ApiError::Service { code: 401, .. })
    }
}

/// The JSON envelope every API endpoint responds with.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default, rename = "x-traceID")]
    trace_id: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Unwrap an API response envelope into its `data` payload.
///
/// A non-200 status or a non-envelope body is a protocol error; a non-zero
/// envelope code is a service error carrying the trace id.
pub(crate) async fn read_envelope(
    response: reqwest::Response,
) -> Result<serde_json::Value, ApiError> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(ApiError::Protocol(format!(
            "unexpected HTTP status {status} from API endpoint"
        )));
    }

    let body = response.bytes().await?;
    let envelope: Envelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Protocol(format!("response is not a valid API envelope: {e}")))?;

    if envelope.code != 0 {
        let trace_id = if envelope.trace_id.is_empty() {
            NO_TRACE_ID.to_string()
        } else {
            envelope.trace_id
        };
        return Err(ApiError::Service {
            code: envelope.code,
            message: envelope.message,
            trace_id,
        });
    }

    Ok(envelope.data.unwrap_or(serde_json::Value::Null))
}

/// API client
///
/// Owns the HTTP connection pool, the base URL, and the current access
/// token. Construct one per credential set and pass it explicitly; there is
/// no process-wide instance.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<AccessToken>>,
    provider: Option<Box<dyn TokenProvider>>,
}

impl ApiClient {
    /// Build a client from configuration.
    ///
    /// A configured clientID/clientSecret pair becomes a
    /// [`ClientCredentials`] provider, enabling automatic refresh; a bare
    /// access token is used as-is until the service rejects it.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        let token = config.access_token().map(AccessToken::perpetual);
        let provider = config.client_credentials().map(|(id, secret)| {
            Box::new(ClientCredentials::new(
                http.clone(),
                config.base_url.trim_end_matches('/').to_string(),
                id,
                secret,
            )) as Box<dyn TokenProvider>
        });

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token),
            provider,
        })
    }

    /// Replace the token provider.
    ///
    /// Lets callers plug a custom refresh mechanism in place of the
    /// config-derived one.
    pub fn with_token_provider(mut self, provider: Box<dyn TokenProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// The configured API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one enveloped JSON call against an API endpoint.
    ///
    /// When the call requires auth and the service answers with an
    /// expired-authorization error, the token is refreshed through the
    /// configured provider exactly once and the call replayed; any further
    /// failure propagates unmodified.
    #[tracing::instrument(
        name = "api.call",
        skip(self, query, body),
        fields(http.method = %method, api.path = %path),
        err
    )]
    pub async fn call_api<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        requires_auth: bool,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        match self
            .dispatch(method.clone(), path, query, body, requires_auth)
            .await
        {
            Err(err) if err.is_expired_auth() && requires_auth && self.provider.is_some() => {
                tracing::debug!(path = path, "Access token rejected, refreshing once");
                self.refresh_token().await?;
                self.dispatch(method, path, query, body, requires_auth).await
            }
            other => other,
        }
    }

    /// POST a JSON body to an authenticated endpoint.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.call_api(Method::POST, path, &[], Some(body), true)
            .await
    }

    /// Perform one plain request against a caller-supplied URL.
    ///
    /// Used for presigned chunk upload targets. The request carries no API
    /// authorization; the content length derives from the body's known
    /// size. Returns the response status without reading the body.
    #[tracing::instrument(
        name = "api.raw_transfer",
        skip(self, url, body),
        fields(http.method = %method, upload.bytes = body.len()),
        err
    )]
    pub async fn raw_transfer(
        &self,
        method: Method,
        url: &str,
        body: Bytes,
    ) -> Result<StatusCode, ApiError> {
        let response = self.http.request(method, url).body(body).send().await?;
        Ok(response.status())
    }

    async fn dispatch<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        requires_auth: bool,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .header("Platform", PLATFORM)
            .header(reqwest::header::USER_AGENT, USER_AGENT);

        if !query.is_empty() {
            request = request.query(query);
        }
        if requires_auth {
            request = request.bearer_auth(self.bearer_token().await?);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let data = read_envelope(response).await?;
        serde_json::from_value(data)
            .map_err(|e| ApiError::Protocol(format!("malformed `{path}` response: {e}")))
    }

    /// Current bearer secret, refreshing through the provider when the
    /// cached token is absent or past its known expiry.
    async fn bearer_token(&self) -> Result<String, ApiError> {
        let cached = self.token.read().clone();
        match cached {
            Some(token) if !token.is_expired() => Ok(token.into_secret()),
            // A stale token with no provider still goes out; the server is
            // the authority on validity.
            Some(token) if self.provider.is_none() => Ok(token.into_secret()),
            _ => {
                self.refresh_token().await?;
                self.token
                    .read()
                    .clone()
                    .map(AccessToken::into_secret)
                    .ok_or_else(|| {
                        ApiError::Auth(AuthError::MissingCredentials(
                            "token provider returned no token".into(),
                        ))
                    })
            }
        }
    }

    async fn refresh_token(&self) -> Result<(), ApiError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            ApiError::Auth(AuthError::MissingCredentials(
                "no access token configured and no credential provider available".into(),
            ))
        })?;
        let fresh = provider.refresh().await?;
        *self.token.write() = Some(fresh);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_token(base_url: &str) -> ApiClient {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            access_token: Some("test-token".to_string()),
            ..ApiConfig::default()
        };
        ApiClient::from_config(&config).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = client_with_token("http://localhost:9000/");
        assert_eq!(client.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_expired_auth_detection() {
        let err = ApiError::Service {
            code: 401,
            message: "access token expired".into(),
            trace_id: "t1".into(),
        };
        assert!(err.is_expired_auth());

        let err = ApiError::Service {
            code: 5066,
            message: "file not found".into(),
            trace_id: "t2".into(),
        };
        assert!(!err.is_expired_auth());
    }

    #[test]
    fn test_service_error_display() {
        let err = ApiError::Service {
            code: 401,
            message: "access token expired".into(),
            trace_id: "abc".into(),
        };
        assert_eq!(
            err.to_string(),
            "Service error [401](abc): access token expired"
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_network() {
        let config = ApiConfig {
            base_url: "http://localhost:1".to_string(),
            ..ApiConfig::default()
        };
        let client = ApiClient::from_config(&config).unwrap();
        let result: Result<serde_json::Value, ApiError> = client
            .call_api(Method::GET, "/api/v1/user/info", &[], None::<&()>, true)
            .await;
        assert!(matches!(
            result,
            Err(ApiError::Auth(AuthError::MissingCredentials(_)))
        ));
    }
}
