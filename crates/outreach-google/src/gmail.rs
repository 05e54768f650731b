//! Gmail API mail sender
//!
//! Assembles a minimal RFC 2822 message, base64url-encodes it, and posts
//! it to `users/me/messages/send`. The authenticated user is the sender;
//! Gmail fills in the `From` header itself.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::{error, info, instrument};

use outreach_core::batch::{MailSender, OutgoingMessage, SendError, SentMessage};

use crate::api_error_message;
use crate::auth::TokenSource;

/// Gmail send endpoint.
pub const SEND_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Gmail profile endpoint, used to resolve the sender's own address.
pub const PROFILE_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/profile";

/// Sends mail through the Gmail API on behalf of the token's user.
pub struct GmailMailer {
    http: reqwest::Client,
    token: Arc<dyn TokenSource>,
}

impl GmailMailer {
    pub fn new(http: reqwest::Client, token: Arc<dyn TokenSource>) -> Self {
        Self { http, token }
    }

    /// Address of the authenticated account.
    pub async fn user_email(&self) -> Result<String, SendError> {
        let token = self
            .token
            .token(false)
            .await
            .map_err(|e| SendError::Rejected(e.to_string()))?;

        let response = self
            .http
            .get(PROFILE_ENDPOINT)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SendError::Network(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            return Err(SendError::Rejected(
                api_error_message(&body).unwrap_or_else(|| "Failed to get user email".to_string()),
            ));
        }

        body.get("emailAddress")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| SendError::Rejected("profile response missing emailAddress".to_string()))
    }
}

/// Flatten a message into CRLF-delimited RFC 2822 text.
fn build_rfc2822(message: &OutgoingMessage) -> String {
    [
        format!("To: {}", message.to),
        format!("Subject: {}", message.subject),
        "MIME-Version: 1.0".to_string(),
        "Content-Type: text/plain; charset=utf-8".to_string(),
        String::new(),
        message.body.clone(),
    ]
    .join("\r\n")
}

/// The `raw` field the API expects: base64url without padding.
fn encode_raw(message: &OutgoingMessage) -> String {
    URL_SAFE_NO_PAD.encode(build_rfc2822(message))
}

#[async_trait]
impl MailSender for GmailMailer {
    #[instrument(skip_all, fields(to = %message.to))]
    async fn send(&self, message: &OutgoingMessage) -> Result<SentMessage, SendError> {
        let token = self
            .token
            .token(true)
            .await
            .map_err(|e| SendError::Rejected(e.to_string()))?;

        let response = self
            .http
            .post(SEND_ENDPOINT)
            .bearer_auth(token)
            .json(&serde_json::json!({ "raw": encode_raw(message) }))
            .send()
            .await
            .map_err(|e| SendError::Network(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            let reason =
                api_error_message(&body).unwrap_or_else(|| "Failed to send email".to_string());
            error!(status = %status, reason = %reason, "gmail send rejected");
            return Err(SendError::Rejected(reason));
        }

        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SendError::Rejected("send response missing message id".to_string()))?;

        info!(message_id = %id, "gmail accepted message");
        Ok(SentMessage { id: id.to_string() })
    }
}
