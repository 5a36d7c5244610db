//! Shared HTTP client for upstream sources.
//!
//! Wraps `reqwest` with the behavior every ingestor needs:
//!
//! - a minimum inter-request interval for rate-limit-sensitive upstreams,
//! - up to 5 attempts with exponential backoff from a 2 s floor and
//!   0.8x-1.2x jitter,
//! - `Retry-After` honored on 429 and 5xx responses,
//! - GitHub-style `X-RateLimit-Remaining`/`X-RateLimit-Reset` tracking with
//!   a wait-until-reset on 403.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{Error, Result};

pub const AGENT: &str = "usde (https://github.com/stormlightlabs/usde)";

const MAX_ATTEMPTS: u32 = 5;
const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Default)]
struct RateState {
    last_request: Option<Instant>,
    remaining: Option<i64>,
    reset_at: Option<DateTime<Utc>>,
}

pub struct Fetcher {
    client: reqwest::Client,
    min_interval: Duration,
    min_retry_wait: Duration,
    state: Mutex<RateState>,
}

impl Fetcher {
    /// A fetcher with no inter-request throttle.
    pub fn new() -> Self {
        Self::with_min_interval(Duration::ZERO)
    }

    /// A fetcher that spaces requests at least `min_interval` apart.
    pub fn with_min_interval(min_interval: Duration) -> Self {
        Fetcher {
            client: reqwest::Client::builder()
                .timeout(TIMEOUT)
                .build()
                .expect("reqwest client"),
            min_interval,
            min_retry_wait: Duration::from_secs(2),
            state: Mutex::new(RateState::default()),
        }
    }

    /// GET `url`, retrying transient failures. Returns the first 2xx
    /// response; 4xx (other than 429 and rate-limited 403) fail immediately.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.get_with_headers(url, &[]).await
    }

    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..MAX_ATTEMPTS {
            self.throttle().await;

            let mut req = self.client.get(url).header(USER_AGENT, AGENT);
            for (name, value) in headers {
                req = req.header(*name, *value);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    last_err = Some(Error::upstream(format!("{url}: {err}")));
                    self.sleep_backoff(attempt).await;
                    continue;
                }
            };

            self.update_rate_limits(resp.headers()).await;
            let status = resp.status();

            if status.is_success() {
                return Ok(resp);
            }

            if status == StatusCode::FORBIDDEN && self.rate_limited().await {
                if let Some(wait) = self.until_reset().await {
                    warn!(url, wait_secs = wait.as_secs(), "rate limit exceeded, waiting");
                    tokio::time::sleep(wait).await;
                }
                last_err = Some(Error::upstream(format!("{url}: {status}")));
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let retry_after = retry_after_delay(resp.headers());
                warn!(
                    url,
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    "request throttled, retrying"
                );
                self.sleep_retry(retry_after, attempt).await;
                last_err = Some(Error::upstream(format!("{url}: {status}")));
                continue;
            }

            return Err(Error::upstream(format!("{url}: {status}")));
        }

        Err(last_err.unwrap_or_else(|| Error::upstream(format!("{url}: request failed"))))
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .get_with_headers(url, &[("Accept", "application/json")])
            .await?;
        resp.json()
            .await
            .map_err(|err| Error::upstream(format!("{url}: decode: {err}")))
    }

    /// GET and buffer the whole body.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.get(url).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| Error::upstream(format!("{url}: read body: {err}")))?;
        Ok(bytes.to_vec())
    }

    /// GET and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self.get(url).await?;
        resp.text()
            .await
            .map_err(|err| Error::upstream(format!("{url}: read body: {err}")))
    }

    async fn throttle(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        state.last_request = Some(Instant::now());
    }

    async fn update_rate_limits(&self, headers: &HeaderMap) {
        let mut state = self.state.lock().await;
        if let Some(remaining) = header_i64(headers, "x-ratelimit-remaining") {
            state.remaining = Some(remaining);
        }
        if let Some(reset) = header_i64(headers, "x-ratelimit-reset") {
            state.reset_at = DateTime::from_timestamp(reset, 0);
        }
    }

    async fn rate_limited(&self) -> bool {
        self.state.lock().await.remaining == Some(0)
    }

    async fn until_reset(&self) -> Option<Duration> {
        let reset_at = self.state.lock().await.reset_at?;
        (reset_at - Utc::now()).to_std().ok()
    }

    async fn sleep_backoff(&self, attempt: u32) {
        let base = Duration::from_secs(1 << attempt).max(self.min_retry_wait);
        tokio::time::sleep(jitter(base)).await;
    }

    async fn sleep_retry(&self, retry_after: Option<Duration>, attempt: u32) {
        match retry_after {
            Some(wait) => tokio::time::sleep(jitter(wait.max(self.min_retry_wait))).await,
            None => self.sleep_backoff(attempt).await,
        }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// `Retry-After` as either delay-seconds or an HTTP date.
fn retry_after_delay(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?;
    (when.with_timezone(&Utc) - Utc::now()).to_std().ok()
}

/// Scale a wait by a random factor in 0.8..=1.2.
fn jitter(d: Duration) -> Duration {
    if d.is_zero() {
        return d;
    }
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    d.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_band() {
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let j = jitter(base);
            assert!(j >= Duration::from_secs(8), "{j:?}");
            assert!(j <= Duration::from_secs(12), "{j:?}");
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn retry_after_parses_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after_delay(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_parses_http_date() {
        let future = (Utc::now() + chrono::Duration::seconds(30)).to_rfc2822();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, future.parse().unwrap());
        let delay = retry_after_delay(&headers).unwrap();
        assert!(delay <= Duration::from_secs(31));
        assert!(delay >= Duration::from_secs(25));
    }

    #[test]
    fn retry_after_missing_is_none() {
        assert_eq!(retry_after_delay(&HeaderMap::new()), None);
    }
}
