//! Google API implementations of the outreach collaborator traits
//!
//! - [`gmail::GmailMailer`] sends mail (`MailSender`)
//! - [`sheets::SheetsClient`] reads recipients and writes statuses
//!   (`RowSource` / `RowSink`)
//! - [`gemini::GeminiRewriter`] rewrites templates
//! - [`auth`] produces the bearer tokens the first two need
//!
//! All clients share one `reqwest::Client`; none of them hold pipeline
//! state.

pub mod auth;
pub mod gemini;
pub mod gmail;
pub mod sheets;

pub use auth::{AuthError, RefreshTokenSource, StaticTokenSource, TokenSource};
pub use gemini::{GeminiRewriter, RewriteError};
pub use gmail::GmailMailer;
pub use sheets::{extract_spreadsheet_id, InvalidSheetUrl, SheetsClient};

/// Human-readable reason from a Google API error payload
/// (`{"error": {"message": ...}}`), when one is present.
pub(crate) fn api_error_message(body: &serde_json::Value) -> Option<String> {
    body.pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(String::from)
}
