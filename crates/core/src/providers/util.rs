use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::errors::CoreError;

/// Shared HTTP client settings for every provider.
pub fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("Mozilla/5.0 (compatible; couples-finance/0.1)")
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Bounded retry with exponential backoff.
///
/// Attempt `n` (1-based) that fails with a retryable error waits
/// `base_delay_ms * 2^(n-1)` before the next try; HTTP 429 doubles that wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total tries including the first one
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay_ms: 0,
        }
    }

    pub fn delay_for(&self, attempt: u32, rate_limited: bool) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let mut delay = self.base_delay_ms.saturating_mul(factor);
        if rate_limited {
            delay = delay.saturating_mul(2);
        }
        Duration::from_millis(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

/// Network failures, 429 and 5xx are worth another try. Everything else is final.
pub fn is_retryable(err: &CoreError) -> bool {
    match err {
        CoreError::Network(_) => true,
        CoreError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

fn is_rate_limited(err: &CoreError) -> bool {
    matches!(err, CoreError::HttpStatus { status: 429, .. })
}

/// Run `operation` until it succeeds, fails with a final error, or the
/// policy's attempts are used up.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_retryable(&err) => {
                let delay = policy.delay_for(attempt, is_rate_limited(&err));
                debug!(
                    "{label}: attempt {attempt}/{attempts} failed: {err}. Retrying in {}ms",
                    delay.as_millis()
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// GET `url` and decode a JSON body, retrying per `policy`.
///
/// Non-2xx responses become `CoreError::HttpStatus`; undecodable bodies
/// become `CoreError::Api`.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    provider: &str,
    url: &str,
    query: &[(&str, &str)],
    policy: &RetryPolicy,
) -> Result<T, CoreError> {
    with_retry(policy, provider, || async move {
        debug!(provider, url, "GET");
        let resp = client
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::HttpStatus {
                provider: provider.to_string(),
                status: status.as_u16(),
            });
        }
        resp.json::<T>().await.map_err(|e| CoreError::Api {
            provider: provider.to_string(),
            message: format!("Malformed response: {e}"),
        })
    })
    .await
}
