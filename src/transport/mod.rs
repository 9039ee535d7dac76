//! Resilient HTTP transport
//!
//! This module provides the outbound client shared by collectors, the vision
//! client and image storage, with features including:
//! - Per-host concurrency gates shared across call sites
//! - User-Agent rotation on every attempt
//! - Retry with backoff that honours `Retry-After`
//! - Per-request timeout

pub mod backoff;
pub mod gate;
pub mod headers;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::metrics;
use crate::utils::error::TransportError;
use crate::utils::extract_host;

use self::backoff::Disposition;
use self::gate::HostGates;
use self::headers::UserAgentRotation;

/// Per-request options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// HTTP method
    pub method: Method,

    /// Extra headers, applied after the rotating identification headers
    pub headers: HeaderMap,

    /// Request body
    pub body: Option<Bytes>,

    /// Total attempts before giving up
    pub max_retries: u32,

    /// Base delay for backoff
    pub backoff: Duration,

    /// Per-attempt timeout
    pub timeout: Duration,

    /// Maximum in-flight requests to the destination host
    pub per_host_limit: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            max_retries: 3,
            backoff: Duration::from_millis(2000),
            timeout: Duration::from_millis(15_000),
            per_host_limit: 4,
        }
    }
}

impl FetchOptions {
    /// Options derived from the transport section of the configuration
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            per_host_limit: config.per_host_concurrency,
            ..Default::default()
        }
    }

    /// Add a header, replacing any previous value
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Turn this into a JSON POST
    pub fn post_json<T: Serialize>(mut self, body: &T) -> Result<Self, TransportError> {
        let bytes = serde_json::to_vec(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        self.method = Method::POST;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn per_host_limit(mut self, limit: usize) -> Self {
        self.per_host_limit = limit;
        self
    }
}

/// Outbound HTTP client with retry and per-host limiting
///
/// Cloning is cheap; clones share the connection pool, the host gates and the
/// User-Agent cursor.
#[derive(Debug, Clone)]
pub struct TransportClient {
    client: Client,
    gates: HostGates,
    agents: UserAgentRotation,
    defaults: FetchOptions,
}

impl TransportClient {
    /// Create a client with default options
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Http` if the HTTP client cannot be created
    pub fn new() -> Result<Self, TransportError> {
        Self::with_defaults(FetchOptions::default())
    }

    /// Create a client from configuration
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::with_defaults(FetchOptions::from_config(config))
    }

    /// Create a client whose convenience helpers use `defaults`
    pub fn with_defaults(defaults: FetchOptions) -> Result<Self, TransportError> {
        let client = Client::builder().gzip(true).build()?;

        Ok(Self {
            client,
            gates: HostGates::new(),
            agents: UserAgentRotation::new(),
            defaults,
        })
    }

    /// Options used by the convenience helpers
    pub fn options(&self) -> FetchOptions {
        self.defaults.clone()
    }

    /// The shared gate cache
    pub fn gates(&self) -> &HostGates {
        &self.gates
    }

    /// Issue a request, retrying on 429, 5xx and network failures
    ///
    /// Any other response, including 4xx, is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::RetriesExhausted` once the retry budget is spent,
    /// or `TransportError::InvalidUrl` if the URL has no host
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<Response, TransportError> {
        let host = extract_host(url)?;
        let gate = self.gates.gate(&host, options.per_host_limit);
        let attempts = options.max_retries.max(1);
        let mut last = String::from("no attempt made");

        for attempt in 1..=attempts {
            let result = {
                // The permit covers the request only, never the backoff sleep
                let _permit = gate.acquire().await.ok();
                self.send_once(url, options).await
            };

            let (delay, reason) = match result {
                Ok(response) => {
                    let status = response.status();
                    let hint = backoff::retry_after(response.headers());

                    match Disposition::of(status) {
                        Disposition::Return => return Ok(response),
                        Disposition::RateLimited => {
                            last = format!("status {status}");
                            (
                                backoff::rate_limited_delay(options.backoff, attempt, hint),
                                "rate_limited",
                            )
                        }
                        Disposition::ServerError => {
                            last = format!("status {status}");
                            (
                                backoff::server_error_delay(options.backoff, attempt, hint),
                                "server_error",
                            )
                        }
                    }
                }
                Err(e) => {
                    last = if e.is_timeout() {
                        TransportError::Timeout.to_string()
                    } else {
                        e.to_string()
                    };
                    (backoff::network_delay(options.backoff, attempt), "network")
                }
            };

            if attempt < attempts {
                tracing::warn!(
                    url,
                    attempt,
                    max_attempts = attempts,
                    reason,
                    delay_ms = delay.as_millis() as u64,
                    error = %last,
                    "Request failed, backing off"
                );
                metrics::record_transport_retry(reason);
                tokio::time::sleep(delay).await;
            }
        }

        Err(TransportError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last,
        })
    }

    async fn send_once(&self, url: &str, options: &FetchOptions) -> reqwest::Result<Response> {
        let mut headers = self.agents.attempt_headers();
        headers.extend(options.headers.clone());

        let mut request = self
            .client
            .request(options.method.clone(), url)
            .headers(headers)
            .timeout(options.timeout);

        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        request.send().await
    }

    /// Fetch with default options and require a 2xx response
    pub async fn fetch_ok(&self, url: &str) -> Result<Response, TransportError> {
        let response = self.fetch(url, &self.defaults).await?;
        ensure_success(url, response)
    }

    /// Fetch and decode the body as text
    pub async fn fetch_text(&self, url: &str) -> Result<String, TransportError> {
        Ok(self.fetch_ok(url).await?.text().await?)
    }

    /// Fetch and decode the body as JSON
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransportError> {
        let bytes = self.fetch_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Fetch the raw body
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, TransportError> {
        Ok(self.fetch_ok(url).await?.bytes().await?)
    }
}

/// Convert a non-2xx response into `TransportError::Status`
pub fn ensure_success(url: &str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}
