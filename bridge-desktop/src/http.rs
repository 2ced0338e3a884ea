//! Desktop `HttpClient` backed by reqwest (rustls).

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::{header::RETRY_AFTER, Client, Method};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("spotify-client-core/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest `Retry-After` the client is willing to sleep through before
/// handing a 429 back to the caller.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Retries 5xx and 429 responses and transport failures, never more often
/// than the caller's [`RetryPolicy`] allows. A 429 carrying `Retry-After`
/// waits for the advertised interval instead of the backoff.
pub struct ReqwestHttpClient {
    client: Client,
    timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Wrap an already configured reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    async fn send_once(&self, request: &HttpRequest) -> std::result::Result<reqwest::Response, BridgeError> {
        let mut builder = self.client.request(to_method(request.method), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Timeout(request.timeout.unwrap_or(self.timeout))
            } else if e.is_connect() {
                BridgeError::OperationFailed(format!("Connection failed: {}", e))
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default()).await
    }

    async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let is_last = attempt == max_attempts;
            debug!(
                attempt,
                max_attempts,
                method = ?request.method,
                url = %request.url,
                "Sending HTTP request"
            );

            let delay = match self.send_once(&request).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    // The last attempt returns whatever came back so the
                    // caller can read the error body.
                    if !is_retryable_status(status) || is_last {
                        return read_response(response).await;
                    }
                    warn!(status, attempt, "Retryable HTTP status");
                    retry_after(&response).unwrap_or_else(|| backoff_delay(&policy, attempt))
                }
                Err(e) if is_last => return Err(e),
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP request failed");
                    backoff_delay(&policy, attempt)
                }
            };

            sleep(delay).await;
        }

        Err(BridgeError::OperationFailed("No HTTP attempt was made".to_string()))
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
    }
}

fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    if !policy.use_exponential_backoff {
        return policy.base_delay;
    }
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    policy.base_delay.saturating_mul(factor).min(policy.max_delay)
}

/// `Retry-After` in seconds, if present and short enough to wait for.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    parse_retry_after(response.headers().get(RETRY_AFTER)?.to_str().ok()?)
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    let delay = Duration::from_secs(value.trim().parse().ok()?);
    (delay <= MAX_RETRY_AFTER).then_some(delay)
}

async fn read_response(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    let body = response
        .bytes()
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Failed to read response body: {}", e)))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}
