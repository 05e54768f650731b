//! HTTP handlers for the outreach API

use axum::{extract::State, Json};
use std::sync::Arc;

use outreach_core::campaign::run_campaign;
use outreach_core::types::Template;
use outreach_google::{GmailMailer, SheetsClient};

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": outreach_core::VERSION,
        "sentToday": state.limiter.sent_today(),
        "remaining": state.limiter.remaining(),
    }))
}

/// Hand out a Google access token (for clients driving the APIs directly)
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let access_token = state.token.token(req.interactive).await?;
    Ok(Json(TokenResponse { access_token }))
}

/// Current rate limit standing
pub async fn get_limits(State(state): State<Arc<AppState>>) -> Json<LimitsResponse> {
    Json(LimitsResponse {
        sent_today: state.limiter.sent_today(),
        remaining: state.limiter.remaining(),
        max_per_day: state.limiter.policy().max_per_day,
    })
}

/// Run one campaign against a spreadsheet
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendCampaignRequest>,
) -> Result<Json<SendCampaignResponse>, ApiError> {
    if req.subject.trim().is_empty() || req.body.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "subject and body must not be empty".into(),
        ));
    }

    let range = req
        .sheet_range
        .as_deref()
        .unwrap_or(&state.config.default_sheet_range);
    let sheets = SheetsClient::for_url(
        state.http.clone(),
        state.token.clone(),
        &req.sheet_url,
        range,
        state.config.status_column.clone(),
    )
    .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    let mailer = GmailMailer::new(state.http.clone(), state.token.clone());
    let template = Template::new(&req.subject, &req.body);
    let reporter = state.reporter();

    // Campaigns share one limiter; run them one at a time.
    let _gate = state.campaign_gate.lock().await;

    let result = run_campaign(
        &template,
        &sheets,
        &sheets,
        &mailer,
        &state.limiter,
        &reporter,
    )
    .await?;

    Ok(Json(SendCampaignResponse {
        total: result.total,
        successful: result.successful,
        failed: result.failed,
        remaining_today: state.limiter.remaining(),
    }))
}

/// Rewrite a template with Gemini
pub async fn rewrite_template(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RewriteRequest>,
) -> Result<Json<RewriteResponse>, ApiError> {
    if req.api_key.trim().is_empty() {
        return Err(ApiError::InvalidRequest("apiKey must not be empty".into()));
    }

    let template = Template::new(&req.subject, &req.body);
    let rewritten = state.rewriter.rewrite(&req.api_key, &template).await?;

    Ok(Json(RewriteResponse {
        subject: rewritten.subject,
        body: rewritten.body,
    }))
}
