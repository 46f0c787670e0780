//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy, StreamingResponse},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("drive-fetch/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - Opt-in retry with exponential backoff (`execute_with_retry`)
/// - Streaming bodies for chunked downloads
/// - rustls TLS
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(Duration::from_secs(10))
    }

    /// Create a new HTTP client with a custom connect timeout.
    ///
    /// No overall request timeout is set: streamed downloads of large files
    /// may legitimately run for a long time. Per-request timeouts can be set
    /// on the `HttpRequest` itself.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(10)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn collect_headers(response: &reqwest::Response) -> HashMap<String, String> {
        response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect()
    }

    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout(e.to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    async fn send_once(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);
        let body = response.bytes().await.map_err(Self::map_send_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Execute request with retry logic
    async fn execute_with_retry_internal(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                attempt = attempt,
                max_attempts = max_attempts,
                "Executing HTTP request"
            );

            let outcome = self.send_once(request.clone()).await;

            match &outcome {
                Ok(response) if RetryPolicy::is_retryable_status(response.status) => {
                    warn!(
                        status = response.status,
                        attempt = attempt,
                        "HTTP request failed with retryable status"
                    );
                }
                Ok(_) => return outcome,
                Err(e) => {
                    warn!(error = %e, attempt = attempt, "HTTP request failed");
                }
            }

            if attempt >= max_attempts {
                return outcome;
            }

            let delay = policy.delay_for_attempt(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send_once(request).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.execute_with_retry_internal(request, policy).await
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamingResponse> {
        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);
        let content_length = response.content_length();

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = StreamReader::new(stream);

        Ok(StreamingResponse {
            status,
            headers,
            content_length,
            body: Box::new(reader),
        })
    }
}
