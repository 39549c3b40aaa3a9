use crate::config::SourceConfig;
use anyhow::{Context, Result};
use rand::RngExt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
}

impl FetchError {
    /// Transport failures and non-2xx statuses both get the full retry budget;
    /// only exhaustion surfaces the last cause to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport { .. } | FetchError::Status { .. })
    }
}

pub struct HttpClient {
    inner: reqwest::Client,
    config: SourceConfig,
}

impl HttpClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as text with rate-limiting and retry.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.polite_delay().await;

        // retry_base_ms, then doubled per attempt, jittered
        let backoff = ExponentialBackoff::from_millis(2)
            .factor(self.config.retry_base_ms)
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::spawn(backoff, || self.try_get(url), |e: &FetchError| {
            let retry = e.is_retryable();
            if retry {
                warn!("{e}, retrying");
            }
            retry
        })
        .await
    }

    async fn try_get(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }

        resp.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })
    }

    /// Sleep for the configured inter-request delay + random jitter. Combined
    /// with strictly sequential calls this is the pipeline's rate limiter.
    async fn polite_delay(&self) {
        let jitter_ms = rand::rng().random_range(0..=self.config.jitter_ms);
        let total = Duration::from_millis(self.config.request_delay_ms + jitter_ms);
        sleep(total).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
