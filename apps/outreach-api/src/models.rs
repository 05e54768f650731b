//! Request and response models for the outreach API

use serde::{Deserialize, Serialize};

/// Request to run a campaign against a spreadsheet
#[derive(Debug, Clone, Deserialize)]
pub struct SendCampaignRequest {
    pub subject: String,
    pub body: String,
    #[serde(rename = "sheetUrl")]
    pub sheet_url: String,
    /// A1-notation range to read; server default when absent
    #[serde(rename = "sheetRange", default)]
    pub sheet_range: Option<String>,
}

/// Aggregate result of one campaign run
#[derive(Debug, Clone, Serialize)]
pub struct SendCampaignResponse {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(rename = "remainingToday")]
    pub remaining_today: u32,
}

/// Request for an access token
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub interactive: bool,
}

/// Access token response
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// Current rate limit standing
#[derive(Debug, Clone, Serialize)]
pub struct LimitsResponse {
    #[serde(rename = "sentToday")]
    pub sent_today: u32,
    pub remaining: u32,
    #[serde(rename = "maxPerDay")]
    pub max_per_day: u32,
}

/// Request to rewrite a template
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteRequest {
    pub subject: String,
    pub body: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

/// Rewritten template
#[derive(Debug, Clone, Serialize)]
pub struct RewriteResponse {
    pub subject: String,
    pub body: String,
}
