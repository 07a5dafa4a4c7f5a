use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::LlmError;

const FIRST_DELAY: Duration = Duration::from_secs(1);
const DELAY_CAP: Duration = Duration::from_secs(60);

/// Bounded retry of HTTP 429 responses.
///
/// Only rate limiting is handled here. Every other status goes back to the
/// caller, and transport errors surface immediately.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetry {
    provider: &'static str,
    max_retries: u32,
    first_delay: Duration,
    cap: Duration,
}

impl RateLimitRetry {
    pub(crate) fn new(provider: &'static str, max_retries: u32) -> Self {
        Self {
            provider,
            max_retries,
            first_delay: FIRST_DELAY,
            cap: DELAY_CAP,
        }
    }

    #[cfg(test)]
    fn with_delays(mut self, first_delay: Duration, cap: Duration) -> Self {
        self.first_delay = first_delay;
        self.cap = cap;
        self
    }

    /// Delay before retry number `attempt + 1`: `Retry-After` seconds if the
    /// server sent them, else doubling from the first delay. Always capped.
    fn delay(&self, headers: &HeaderMap, attempt: u32) -> Duration {
        let advertised = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let delay = advertised.unwrap_or_else(|| {
            self.first_delay
                .checked_mul(2u32.saturating_pow(attempt))
                .unwrap_or(self.cap)
        });
        delay.min(self.cap)
    }

    /// Issue the request built by `send`, re-issuing it after each 429.
    ///
    /// # Errors
    ///
    /// `LlmError::RateLimited` once `max_retries` retries were all rate limited,
    /// `LlmError::Http` for transport failures.
    pub(crate) async fn send<F, Fut>(&self, mut send: F) -> Result<reqwest::Response, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            let response = send().await.map_err(LlmError::Http)?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            if attempt >= self.max_retries {
                return Err(LlmError::RateLimited);
            }
            let delay = self.delay(response.headers(), attempt);
            attempt += 1;
            tracing::warn!(
                provider = self.provider,
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
