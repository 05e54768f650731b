//! OAuth2 access tokens for the Google APIs
//!
//! Two sources: a fixed token handed in by the caller, and a refresh-token
//! exchange against `oauth2.googleapis.com` with an in-process expiry
//! cache. Both hide behind [`TokenSource`] so the Gmail and Sheets clients
//! never care where the bearer token came from.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Scope required to send mail through the Gmail API.
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Scope required to read and write spreadsheet values.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Google's OAuth2 token endpoint.
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refreshed tokens are considered stale this many seconds before their
/// reported expiry, so a token never dies mid-request.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The user or the OAuth server refused the grant.
    #[error("authorization denied: {0}")]
    Denied(String),

    /// No token is available and the source is not allowed to obtain one.
    #[error("no cached token available")]
    NoCachedToken,

    /// The token request itself failed.
    #[error("token request failed: {0}")]
    Http(String),

    /// The token endpoint answered with something unparseable.
    #[error("malformed token response: {0}")]
    Malformed(String),
}

/// Produces a bearer token for Google API calls. `interactive` signals
/// whether the source may go through a user-visible grant; sources that
/// refresh silently ignore it.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, interactive: bool) -> Result<String, AuthError>;
}

/// A caller-supplied token, used as-is. Typical for short-lived sessions
/// where the front end already ran the consent flow.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self, _interactive: bool) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Exchanges a long-lived refresh token for access tokens, caching each
/// one until shortly before its expiry.
pub struct RefreshTokenSource {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl RefreshTokenSource {
    pub fn new(
        http: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            cached: RwLock::new(None),
        }
    }

    #[instrument(skip_all)]
    async fn refresh(&self) -> Result<CachedToken, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        if !status.is_success() {
            let code = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown_error");
            let description = body
                .get("error_description")
                .and_then(|v| v.as_str())
                .unwrap_or(code);
            warn!(status = %status, error = code, "token refresh rejected");
            if code == "access_denied" || code == "invalid_grant" {
                return Err(AuthError::Denied(description.to_string()));
            }
            return Err(AuthError::Http(format!("{status}: {description}")));
        }

        let parsed: TokenResponse =
            serde_json::from_value(body).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let expires_at = chrono::Utc::now().timestamp() + parsed.expires_in.unwrap_or(3600);
        debug!("access token refreshed");

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn token(&self, _interactive: bool) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        if let Some(cached) = self.cached.read().await.as_ref() {
            if now + EXPIRY_MARGIN_SECS < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let fresh = self.refresh().await?;
        let token = fresh.access_token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(token)
    }
}

/// Build a token source from the process environment.
///
/// `GOOGLE_ACCESS_TOKEN` wins when set; otherwise `GOOGLE_CLIENT_ID`,
/// `GOOGLE_CLIENT_SECRET`, and `GOOGLE_REFRESH_TOKEN` together select the
/// refresh flow. [`AuthError::NoCachedToken`] when neither is configured.
pub fn token_source_from_env(http: reqwest::Client) -> Result<Arc<dyn TokenSource>, AuthError> {
    if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(Arc::new(StaticTokenSource::new(token)));
        }
    }

    match (
        std::env::var("GOOGLE_CLIENT_ID"),
        std::env::var("GOOGLE_CLIENT_SECRET"),
        std::env::var("GOOGLE_REFRESH_TOKEN"),
    ) {
        (Ok(id), Ok(secret), Ok(refresh)) => {
            Ok(Arc::new(RefreshTokenSource::new(http, id, secret, refresh)))
        }
        _ => Err(AuthError::NoCachedToken),
    }
}
