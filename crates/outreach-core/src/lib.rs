//! Outreach core - rate-limited email campaign pipeline
//!
//! Turns a subject/body template plus a list of spreadsheet rows into a
//! sequence of sequential, rate-limited send calls with per-recipient
//! result tracking:
//!
//! ```text
//! rows ──> validate + personalize ──> send loop ──> outcomes ──> statuses
//!                                        │
//!                                  RateLimiter
//!                            (daily cap, 3s spacing,
//!                             persisted daily counter)
//! ```
//!
//! The external collaborators (mail API, row source/sink, progress
//! observer, durable store) are traits; this crate contains no network
//! code. See `outreach-google` for the Gmail/Sheets/Gemini implementations.
//!
//! Invariants the pipeline upholds:
//! - sends are strictly sequential, at least `min_interval` apart within a
//!   session, and capped at `max_per_day` per calendar day;
//! - the daily counter resets exactly once on the first initialization of
//!   a new day and is never decremented otherwise;
//! - a batch always yields exactly one outcome per recipient, in input
//!   order, including recipients short-circuited by the cap;
//! - progress notifications are best-effort and can never affect a batch.

pub mod batch;
pub mod campaign;
pub mod limiter;
pub mod progress;
pub mod types;

pub use batch::{send_batch, MailSender, OutgoingMessage, SendError, SentMessage};
pub use campaign::{
    run_campaign, CampaignError, RowSink, RowSource, SheetReadError, SheetWriteError,
};
pub use limiter::{
    JsonFileStore, LimitStore, MemoryStore, RateLimitPolicy, RateLimitSnapshot, RateLimiter,
};
pub use progress::{NotifyError, ProgressEvent, ProgressObserver, Reporter};
pub use types::{
    is_valid_email, personalize, personalize_rows, status_updates, BatchResult,
    PersonalizedRecipient, RecipientRow, RowError, RowStatus, RowValidation, SendOutcome, Template,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for the outreach pipeline
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    /// Daily send cap
    pub max_per_day: u32,

    /// Minimum spacing between two sends, in milliseconds
    pub send_interval_ms: u64,

    /// Bound on a single progress notification, in milliseconds
    pub progress_timeout_ms: u64,

    /// Sheet range read when the caller does not supply one
    pub default_sheet_range: String,

    /// Spreadsheet column the per-row status is written to
    pub status_column: String,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            max_per_day: limiter::DEFAULT_MAX_PER_DAY,
            send_interval_ms: 3000,
            progress_timeout_ms: 1000,
            default_sheet_range: "Sheet1!A1:F100".to_string(),
            status_column: "E".to_string(),
        }
    }
}

impl OutreachConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_per_day: std::env::var("OUTREACH_MAX_PER_DAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_per_day),
            send_interval_ms: std::env::var("OUTREACH_SEND_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.send_interval_ms),
            progress_timeout_ms: std::env::var("OUTREACH_PROGRESS_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.progress_timeout_ms),
            default_sheet_range: std::env::var("OUTREACH_SHEET_RANGE")
                .unwrap_or(defaults.default_sheet_range),
            status_column: std::env::var("OUTREACH_STATUS_COLUMN")
                .unwrap_or(defaults.status_column),
        }
    }

    /// Policy slice handed to the [`RateLimiter`].
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_per_day: self.max_per_day,
            min_interval: std::time::Duration::from_millis(self.send_interval_ms),
        }
    }
}
