//! HTTP client for pushing batches to the collection endpoint

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::queue::DomainRecord;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid push URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Push failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<PushError>,
    },
}

pub type Result<T> = std::result::Result<T, PushError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Sent as `Authorization: Bearer <token>` when set
    pub token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("sitekick-push/", env!("CARGO_PKG_VERSION")).to_string(),
            token: None,
        }
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    data: &'a [DomainRecord],
}

/// Encode records as the `{"data": [...]}` request body
pub fn encode_batch(records: &[DomainRecord]) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(&Payload { data: records })?))
}

/// Posts batches with retry
pub struct PushClient {
    client: Client,
    url: Url,
    token: Option<String>,
    backoff: Backoff,
}

impl PushClient {
    pub fn new(url: &str, config: HttpConfig, backoff: Backoff) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| PushError::InvalidUrl(format!("{url}: {e}")))?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| PushError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            url,
            token: config.token.filter(|t| !t.is_empty()),
            backoff,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Push one batch, retrying non-2xx answers and transport errors
    pub async fn push(&self, records: &[DomainRecord]) -> Result<()> {
        let body = encode_batch(records)?;
        let attempts = self.backoff.attempts();

        for attempt in 0..attempts {
            match self.push_once(body.clone()).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(url = %self.url, attempt = attempt + 1, "Push succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        url = %self.url,
                        attempt = attempt + 1,
                        attempts,
                        error = %e,
                        "Push failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(url = %self.url, attempts, error = %e, "Push failed after retries");
                    return Err(PushError::Exhausted {
                        attempts,
                        last: Box::new(e),
                    });
                }
            }
        }

        // attempts is at least one, so the loop always returns
        Err(PushError::RequestFailed("no push attempt made".to_string()))
    }

    /// Push once (no retry)
    async fn push_once(&self, body: Bytes) -> Result<()> {
        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .header(ACCEPT, mime::APPLICATION_JSON.as_ref())
            .body(body);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PushError::Timeout
            } else {
                PushError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        debug!(url = %self.url, status = status.as_u16(), "Batch accepted");
        Ok(())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
