//! Rate-limited, retried calls to one remote API
//!
//! [`RemoteApiClient`] composes a [`RateLimiter`] (applied before every
//! outbound request) and a [`RetryPolicy`] (wrapping the request) around a
//! [`Transport`] that performs exactly one request.

use async_trait::async_trait;
use lotus_common::{ErrorKind, LotusError, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;

/// Default per-call timeout in seconds
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response: status, lower-cased header names, body text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    fn into_result(self, url: &str) -> Result<Self> {
        match self.status {
            200..=299 => Ok(self),
            404 => Err(LotusError::NotFound(url.to_string())),
            429 => Err(LotusError::RateLimitExceeded(format!("{} answered 429", url))),
            500..=599 => Err(LotusError::network(format!(
                "{} answered {}: {}",
                url,
                self.status,
                snippet(&self.body)
            ))),
            status => Err(LotusError::Remote {
                status,
                message: snippet(&self.body),
            }),
        }
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Performs a single request, no retries, no pacing
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// [`Transport`] over a shared `reqwest` client
///
/// Cookies persist across requests so a Wikibase login session survives.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| LotusError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify_reqwest)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(classify_reqwest)?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest(err: reqwest::Error) -> LotusError {
    if err.is_timeout() {
        LotusError::Timeout(Duration::ZERO)
    } else {
        LotusError::network(err.to_string())
    }
}

/// One logical request stream to one remote API
pub struct RemoteApiClient {
    name: String,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    timeout: Duration,
}

impl RemoteApiClient {
    /// Network failures and throttling are retried; everything else is not.
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>, limiter: RateLimiter) -> Self {
        Self {
            name: name.into(),
            transport,
            limiter,
            retry: RetryPolicy::default()
                .recovering([ErrorKind::Network, ErrorKind::RateLimitExceeded]),
            timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send `request`, waiting for the limiter first and retrying recoverable
    /// failures. Non-2xx statuses are turned into errors: 404 `NotFound`,
    /// 429 `RateLimitExceeded`, 5xx `Network`, anything else `Remote`.
    pub async fn call(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.retry
            .run(&self.name, || self.call_once(request))
            .await
    }

    /// Send `request` a single time, still paced by the limiter. For
    /// callers that retry the whole operation themselves.
    pub async fn call_once(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut permit = self.limiter.acquire().await;
        trace!(api = %self.name, url = %request.url, "Sending request");

        let response = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result.map_err(|err| match err {
                LotusError::Timeout(_) => LotusError::Timeout(self.timeout),
                other => other,
            })?,
            Err(_) => return Err(LotusError::Timeout(self.timeout)),
        };

        permit.observe(&response.headers);
        drop(permit);

        debug!(api = %self.name, url = %request.url, status = response.status, "Response received");
        response.into_result(&request.url)
    }
}
