//! Error types for the outreach API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use outreach_core::campaign::CampaignError;
use outreach_google::{AuthError, RewriteError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Campaign(#[from] CampaignError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Auth(e) => {
                let status = match e {
                    AuthError::Denied(_) | AuthError::NoCachedToken => StatusCode::UNAUTHORIZED,
                    AuthError::Http(_) | AuthError::Malformed(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string())
            }
            ApiError::Campaign(e) => {
                let status = match e {
                    CampaignError::NoRecipients | CampaignError::NoValidRecipients => {
                        StatusCode::BAD_REQUEST
                    }
                    CampaignError::SheetRead(_) | CampaignError::SheetWrite(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, e.to_string())
            }
            ApiError::Rewrite(e) => {
                let status = match e {
                    RewriteError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    RewriteError::PlaceholdersDropped => StatusCode::UNPROCESSABLE_ENTITY,
                    RewriteError::Http(_) | RewriteError::Rejected(_) | RewriteError::Malformed(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, e.to_string())
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: ApiError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(ApiError::InvalidRequest("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Auth(AuthError::Denied("nope".into()))),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ApiError::Campaign(CampaignError::NoRecipients)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Rewrite(RewriteError::Timeout)),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(ApiError::Rewrite(RewriteError::PlaceholdersDropped)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
