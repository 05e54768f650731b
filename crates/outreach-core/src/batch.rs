//! Sequential send orchestration
//!
//! Drives the per-recipient loop against the shared [`RateLimiter`]: check
//! the daily cap, wait out the inter-send spacing, hand one message to the
//! [`MailSender`], record the outcome, report progress, and keep going past
//! per-recipient failures. The loop is total: exactly one [`SendOutcome`]
//! per input recipient, in input order.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::limiter::RateLimiter;
use crate::progress::{ProgressEvent, Reporter};
use crate::types::{PersonalizedRecipient, SendOutcome};

/// Failure message recorded for recipients short-circuited by the cap.
pub const DAILY_LIMIT_MESSAGE: &str = "Daily send limit reached";

/// One email ready to hand to the mail API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Acknowledgement from the mail API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
}

/// A single send attempt failed. Non-fatal to the batch; the message is
/// surfaced verbatim in the recipient's status string.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    /// The mail API rejected the message (non-2xx with a reason).
    #[error("{0}")]
    Rejected(String),

    /// The request never got a usable response.
    #[error("network error: {0}")]
    Network(String),
}

/// The opaque "send one email" collaborator.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<SentMessage, SendError>;
}

/// Send to every recipient in order, strictly sequentially.
///
/// Messages carry each recipient's personalized subject/body, never the
/// shared template. A capped-out day short-circuits the remaining
/// recipients without touching the sender, but still records a failure
/// outcome per row so the status writer can mark them explicitly.
/// `record_send` runs only on the success path: failed attempts do not
/// consume the daily quota. Callers sharing one limiter must serialize
/// invocations of this function.
#[instrument(skip_all, fields(recipients = recipients.len()))]
pub async fn send_batch(
    recipients: &[PersonalizedRecipient],
    sender: &dyn MailSender,
    limiter: &RateLimiter,
    reporter: &Reporter,
) -> Vec<SendOutcome> {
    let total = recipients.len();
    let mut outcomes = Vec::with_capacity(total);

    for (index, recipient) in recipients.iter().enumerate() {
        if !limiter.can_send() {
            warn!(recipient = %recipient.email, "daily cap reached, skipping send");
            outcomes.push(SendOutcome::failed(recipient.clone(), DAILY_LIMIT_MESSAGE));
            reporter
                .publish(ProgressEvent::Delivery {
                    current: index + 1,
                    total,
                    recipient: recipient.email.clone(),
                    success: false,
                    error: Some(DAILY_LIMIT_MESSAGE.to_string()),
                })
                .await;
            continue;
        }

        limiter.wait().await;

        let message = OutgoingMessage {
            to: recipient.email.clone(),
            subject: recipient.subject.clone(),
            body: recipient.body.clone(),
        };

        let event = match sender.send(&message).await {
            Ok(sent) => {
                limiter.record_send().await;
                info!(recipient = %recipient.email, message_id = %sent.id, "email sent");
                outcomes.push(SendOutcome::delivered(recipient.clone(), sent.id));
                ProgressEvent::Delivery {
                    current: index + 1,
                    total,
                    recipient: recipient.email.clone(),
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!(recipient = %recipient.email, error = %e, "send failed");
                outcomes.push(SendOutcome::failed(recipient.clone(), e.to_string()));
                ProgressEvent::Delivery {
                    current: index + 1,
                    total,
                    recipient: recipient.email.clone(),
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };

        reporter.publish(event).await;
    }

    outcomes
}
