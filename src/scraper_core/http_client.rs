//! Shared HTTP plumbing for every source adapter
//!
//! Wraps a `reqwest::Client` and turns raw status codes into the error
//! taxonomy the adapters reason about:
//!
//! | Response                     | Error          | Retried | Scope      |
//! |------------------------------|----------------|---------|------------|
//! | 429, 403                     | `Throttled`    | yes     | request    |
//! | connect/timeout, 415, 5xx    | `Network`      | yes     | request    |
//! | 400, 404                     | `NotFound`     | no      | item       |
//! | 401                          | `Unauthorized` | no      | whole chain|
//! | 2xx with undecodable body    | `Parse`        | no      | item       |
//!
//! Throttled requests always wait at least `RetryPolicy::throttle_floor`
//! before the retry. The wait only suspends the throttled request; other
//! requests in the same fan-out keep going.

use super::error_handler::ExponentialBackoff;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("throttled by {url} (status {status})")]
    Throttled { url: String, status: u16 },

    #[error("network error on {url}: {message}")]
    Network { url: String, message: String },

    #[error("not found: {url} (status {status})")]
    NotFound { url: String, status: u16 },

    #[error("unauthorized: {url} (status {status})")]
    Unauthorized { url: String, status: u16 },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("undecodable body from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("retries exhausted for {url}: {last}")]
    RetriesExhausted { url: String, last: Box<HttpError> },
}

impl HttpError {
    /// Transient failures worth another attempt after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HttpError::Throttled { .. } | HttpError::Network { .. })
    }

    /// Failures that invalidate every further request to the same API.
    pub fn is_systemic(&self) -> bool {
        matches!(self, HttpError::Unauthorized { .. } | HttpError::Client(_))
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_retries: u32,
    /// Minimum wait after a throttling response
    pub throttle_floor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(350),
            max: Duration::from_secs(30),
            max_retries: 6,
            throttle_floor: Duration::from_secs(15),
        }
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(
        timeout: Duration,
        retry: RetryPolicy,
        headers: &[(&str, String)],
    ) -> Result<Self, HttpError> {
        let mut header_map = HeaderMap::new();
        header_map.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (compatible; MenuFlow/0.1)"),
        );
        header_map.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HttpError::Client(format!("header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HttpError::Client(format!("header value for {}: {}", name.as_str(), e)))?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(header_map)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Ok(Self { client, retry })
    }

    /// GET a JSON document, retrying throttled and transient failures.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, HttpError> {
        let mut backoff = self.backoff();
        loop {
            let attempt = match self.fetch_once(url, query).await {
                Ok(response) => response.json::<Value>().await.map_err(|e| classify_body_error(url, e)),
                Err(e) => Err(e),
            };
            match attempt {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => self.wait_or_give_up(&mut backoff, url, e).await?,
                Err(e) => return Err(e),
            }
        }
    }

    /// GET a text document (HTML store lists), with the same retry rules.
    pub async fn get_text(&self, url: &str) -> Result<String, HttpError> {
        let mut backoff = self.backoff();
        loop {
            let attempt = match self.fetch_once(url, &[]).await {
                Ok(response) => response.text().await.map_err(|e| classify_body_error(url, e)),
                Err(e) => Err(e),
            };
            match attempt {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => self.wait_or_give_up(&mut backoff, url, e).await?,
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.retry.initial, self.retry.max, self.retry.max_retries)
    }

    async fn wait_or_give_up(
        &self,
        backoff: &mut ExponentialBackoff,
        url: &str,
        error: HttpError,
    ) -> Result<(), HttpError> {
        let floor = match error {
            HttpError::Throttled { .. } => self.retry.throttle_floor,
            _ => Duration::ZERO,
        };
        log::debug!("{} → {}, backing off", url, error);
        backoff.sleep_at_least(floor).await.map_err(|_| HttpError::RetriesExhausted {
            url: url.to_string(),
            last: Box::new(error),
        })
    }

    async fn fetch_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, HttpError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| HttpError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        classify_status(url, response.status().as_u16()).map(|_| response)
    }
}

fn classify_status(url: &str, status: u16) -> Result<(), HttpError> {
    let url = url.to_string();
    match status {
        200..=299 => Ok(()),
        401 => Err(HttpError::Unauthorized { url, status }),
        403 | 429 => Err(HttpError::Throttled { url, status }),
        400 | 404 => Err(HttpError::NotFound { url, status }),
        415 | 500..=599 => Err(HttpError::Network {
            url,
            message: format!("status {}", status),
        }),
        _ => Err(HttpError::Status { url, status }),
    }
}

fn classify_body_error(url: &str, error: reqwest::Error) -> HttpError {
    if error.is_decode() {
        HttpError::Parse {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else {
        HttpError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
