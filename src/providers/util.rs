use anyhow::{Context, Error, Result};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries after a failed upstream request, on top of the first attempt.
pub const RETRIES: usize = 3;
/// Pause between upstream request attempts.
pub const RETRY_DELAY_MS: u64 = 300;

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Builds the HTTP client shared by the upstream providers.
///
/// Both upstream sites reject requests without a browser-like user agent.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")
}

/// Upper bound on one upstream call made through [`with_retry`] with [`RETRIES`], where
/// every attempt may run into the client's `request_timeout`.
pub fn retry_budget(request_timeout: Duration) -> Duration {
    let attempts = u32::try_from(RETRIES + 1).unwrap_or(u32::MAX);
    let pauses = u32::try_from(RETRIES).unwrap_or(u32::MAX);
    request_timeout.saturating_mul(attempts)
        + Duration::from_millis(RETRY_DELAY_MS).saturating_mul(pauses)
}

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(anyhow::Error::from) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
