//! Google Sheets recipient source and status sink
//!
//! Reads a bounded range as formatted values, maps the header row onto
//! each data row, and writes per-row statuses back with one
//! `values:batchUpdate` call. Row indices are 1-based spreadsheet rows,
//! header included, so a status for row N lands next to the row it
//! describes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument};

use outreach_core::campaign::{RowSink, RowSource, SheetReadError, SheetWriteError};
use outreach_core::types::{columns, RecipientRow, RowStatus};

use crate::api_error_message;
use crate::auth::TokenSource;

lazy_static! {
    static ref SPREADSHEET_ID_PATTERN: Regex =
        Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap();
}

/// The URL does not name a spreadsheet.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid Google Sheets URL")]
pub struct InvalidSheetUrl;

/// Pull the spreadsheet id out of a full Sheets URL.
pub fn extract_spreadsheet_id(url: &str) -> Result<String, InvalidSheetUrl> {
    SPREADSHEET_ID_PATTERN
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(InvalidSheetUrl)
}

/// One spreadsheet bound to a range and a status column.
pub struct SheetsClient {
    http: reqwest::Client,
    token: Arc<dyn TokenSource>,
    spreadsheet_id: String,
    range: String,
    status_column: String,
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl SheetsClient {
    pub fn new(
        http: reqwest::Client,
        token: Arc<dyn TokenSource>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        status_column: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token,
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            status_column: status_column.into(),
        }
    }

    /// Bind to the spreadsheet a share URL points at.
    pub fn for_url(
        http: reqwest::Client,
        token: Arc<dyn TokenSource>,
        url: &str,
        range: impl Into<String>,
        status_column: impl Into<String>,
    ) -> Result<Self, InvalidSheetUrl> {
        let spreadsheet_id = extract_spreadsheet_id(url)?;
        Ok(Self::new(http, token, spreadsheet_id, range, status_column))
    }

    fn sheet_name(&self) -> &str {
        self.range.split_once('!').map(|(s, _)| s).unwrap_or("Sheet1")
    }

    fn values_url(&self) -> String {
        format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}",
            self.spreadsheet_id, self.range
        )
    }
}

/// Map header-keyed rows onto [`RecipientRow`] values. The first row is
/// the header; rows with a blank `Email` cell are dropped here, before
/// validation ever sees them. Short rows read as empty cells.
fn rows_to_recipients(values: &[Vec<String>]) -> Vec<RecipientRow> {
    let Some((headers, data)) = values.split_first() else {
        return Vec::new();
    };

    data.iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let fields: HashMap<String, String> = headers
                .iter()
                .enumerate()
                .map(|(col, header)| {
                    (
                        header.clone(),
                        row.get(col).cloned().unwrap_or_default(),
                    )
                })
                .collect();

            let has_email = fields
                .get(columns::EMAIL)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);

            // Data starts on spreadsheet row 2
            has_email.then(|| RecipientRow::new((i + 2) as u32, fields))
        })
        .collect()
}

#[async_trait]
impl RowSource for SheetsClient {
    #[instrument(skip_all, fields(range = %self.range))]
    async fn read_rows(&self) -> Result<Vec<RecipientRow>, SheetReadError> {
        let token = self
            .token
            .token(true)
            .await
            .map_err(|e| SheetReadError(e.to_string()))?;

        let response = self
            .http
            .get(self.values_url())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SheetReadError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
            return Err(SheetReadError(
                api_error_message(&body).unwrap_or_else(|| format!("sheet read failed: {status}")),
            ));
        }

        let parsed: ValuesResponse = response
            .json()
            .await
            .map_err(|e| SheetReadError(e.to_string()))?;

        let rows = rows_to_recipients(&parsed.values);
        info!(rows = rows.len(), "sheet rows loaded");
        Ok(rows)
    }
}

#[async_trait]
impl RowSink for SheetsClient {
    #[instrument(skip_all, fields(updates = updates.len()))]
    async fn write_statuses(&self, updates: &[RowStatus]) -> Result<(), SheetWriteError> {
        if updates.is_empty() {
            return Ok(());
        }

        let token = self
            .token
            .token(true)
            .await
            .map_err(|e| SheetWriteError(e.to_string()))?;

        let sheet = self.sheet_name();
        let data: Vec<serde_json::Value> = updates
            .iter()
            .map(|update| {
                serde_json::json!({
                    "range": format!("{sheet}!{}{}", self.status_column, update.row_index),
                    "values": [[update.status]],
                })
            })
            .collect();

        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values:batchUpdate",
            self.spreadsheet_id
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "valueInputOption": "RAW",
                "data": data,
            }))
            .send()
            .await
            .map_err(|e| SheetWriteError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
            return Err(SheetWriteError(
                api_error_message(&body)
                    .unwrap_or_else(|| format!("status write failed: {status}")),
            ));
        }

        info!("row statuses written");
        Ok(())
    }
}
