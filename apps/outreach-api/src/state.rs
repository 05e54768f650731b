//! Application state for the outreach API

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use outreach_core::limiter::JsonFileStore;
use outreach_core::progress::{NotifyError, ProgressEvent, ProgressObserver};
use outreach_core::{OutreachConfig, RateLimiter, Reporter};
use outreach_google::auth::token_source_from_env;
use outreach_google::{GeminiRewriter, TokenSource};

pub struct AppState {
    pub config: OutreachConfig,
    pub http: reqwest::Client,
    pub token: Arc<dyn TokenSource>,
    pub limiter: RateLimiter,
    pub rewriter: GeminiRewriter,
    /// One campaign at a time; concurrent runs would interleave sends
    /// under the shared limiter.
    pub campaign_gate: tokio::sync::Mutex<()>,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let config = OutreachConfig::from_env();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        let token = token_source_from_env(http.clone())
            .context("no Google credentials configured (set GOOGLE_ACCESS_TOKEN or GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET/GOOGLE_REFRESH_TOKEN)")?;

        let store_path = std::env::var("OUTREACH_LIMIT_STORE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let data_dir = dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("outreach-api");
                std::fs::create_dir_all(&data_dir).ok();
                data_dir.join("rate_limit.json")
            });

        tracing::info!("Rate limit store: {}", store_path.display());

        let limiter = RateLimiter::new(
            config.rate_limit_policy(),
            JsonFileStore::new(store_path),
        );
        limiter.initialize().await;

        let rewriter = GeminiRewriter::new(http.clone());

        Ok(Self {
            config,
            http,
            token,
            limiter,
            rewriter,
            campaign_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Reporter that mirrors campaign progress into the server log.
    pub fn reporter(&self) -> Reporter {
        Reporter::with_timeout(
            Arc::new(LogObserver),
            Duration::from_millis(self.config.progress_timeout_ms),
        )
    }
}

/// Progress observer that logs instead of pushing to a UI.
struct LogObserver;

#[async_trait]
impl ProgressObserver for LogObserver {
    async fn notify(&self, event: ProgressEvent) -> Result<(), NotifyError> {
        match &event {
            ProgressEvent::Phase { message, .. } => tracing::info!("{message}"),
            ProgressEvent::Delivery {
                current,
                total,
                recipient,
                success,
                error,
            } => {
                if *success {
                    tracing::info!("[{current}/{total}] sent to {recipient}");
                } else {
                    tracing::warn!(
                        "[{current}/{total}] failed for {recipient}: {}",
                        error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            ProgressEvent::Completed { result } => tracing::info!(
                "campaign finished: {}/{} sent, {} failed",
                result.successful,
                result.total,
                result.failed
            ),
            ProgressEvent::Failed { error } => tracing::error!("campaign aborted: {error}"),
        }
        Ok(())
    }
}

/// Get platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
