//! End-to-end campaign runner
//!
//! Ties the pipeline together: read recipient rows, validate and
//! personalize them, drive [`send_batch`](crate::batch::send_batch), and
//! write per-row statuses back. Top-level failures (row read, row write,
//! empty input) abort with a single [`CampaignError`]; per-recipient send
//! failures never do.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::batch::{send_batch, MailSender};
use crate::limiter::RateLimiter;
use crate::progress::{ProgressEvent, Reporter};
use crate::types::{personalize_rows, status_updates, BatchResult, RecipientRow, RowStatus, Template};

/// Reading the recipient rows failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("sheet read failed: {0}")]
pub struct SheetReadError(pub String);

/// Writing the per-row statuses failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("sheet write failed: {0}")]
pub struct SheetWriteError(pub String);

/// The opaque "fetch rows" collaborator, pre-bound to a sheet and range.
/// The header row is consumed at this boundary and rows without a
/// populated `Email` cell are dropped before validation.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn read_rows(&self) -> Result<Vec<RecipientRow>, SheetReadError>;
}

/// The opaque "write statuses" collaborator: one batched write.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn write_statuses(&self, updates: &[RowStatus]) -> Result<(), SheetWriteError>;
}

/// A campaign aborted before or after the send loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CampaignError {
    #[error(transparent)]
    SheetRead(#[from] SheetReadError),

    #[error(transparent)]
    SheetWrite(#[from] SheetWriteError),

    #[error("no recipients found in sheet")]
    NoRecipients,

    #[error("no valid recipients found")]
    NoValidRecipients,
}

/// Run one batch end to end. Partial success is the steady state: the
/// returned counts may mix sent and failed rows, and callers needing
/// per-recipient detail read the spreadsheet statuses. Callers sharing one
/// limiter must serialize campaign invocations.
#[instrument(skip_all)]
pub async fn run_campaign(
    template: &Template,
    source: &dyn RowSource,
    sink: &dyn RowSink,
    sender: &dyn MailSender,
    limiter: &RateLimiter,
    reporter: &Reporter,
) -> Result<BatchResult, CampaignError> {
    match drive(template, source, sink, sender, limiter, reporter).await {
        Ok(result) => {
            info!(
                total = result.total,
                successful = result.successful,
                failed = result.failed,
                "campaign complete"
            );
            reporter.publish(ProgressEvent::Completed { result }).await;
            Ok(result)
        }
        Err(e) => {
            reporter
                .publish(ProgressEvent::Failed {
                    error: e.to_string(),
                })
                .await;
            Err(e)
        }
    }
}

async fn drive(
    template: &Template,
    source: &dyn RowSource,
    sink: &dyn RowSink,
    sender: &dyn MailSender,
    limiter: &RateLimiter,
    reporter: &Reporter,
) -> Result<BatchResult, CampaignError> {
    reporter
        .publish(ProgressEvent::Phase {
            message: "Reading recipients".into(),
            total: 0,
        })
        .await;

    let rows = source.read_rows().await?;
    if rows.is_empty() {
        return Err(CampaignError::NoRecipients);
    }

    reporter
        .publish(ProgressEvent::Phase {
            message: format!("Found {} recipients", rows.len()),
            total: rows.len(),
        })
        .await;

    let recipients = personalize_rows(template, &rows);
    if recipients.is_empty() {
        return Err(CampaignError::NoValidRecipients);
    }

    reporter
        .publish(ProgressEvent::Phase {
            message: format!("Validated {} recipients", recipients.len()),
            total: recipients.len(),
        })
        .await;

    let outcomes = send_batch(&recipients, sender, limiter, reporter).await;

    reporter
        .publish(ProgressEvent::Phase {
            message: "Updating spreadsheet".into(),
            total: recipients.len(),
        })
        .await;

    let updates = status_updates(&outcomes);
    sink.write_statuses(&updates).await?;

    Ok(BatchResult::from_outcomes(&outcomes))
}
