//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use core_async::time::{sleep, Duration};
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Reqwest-based HTTP client.
///
/// Retries 5xx and 429 responses as well as transport failures according to
/// the supplied [`RetryPolicy`]. Connection failures surface as
/// [`BridgeError::Offline`] and elapsed timeouts as [`BridgeError::Timeout`].
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(60))
    }

    /// Client with an overall per-request ceiling. Individual requests may set
    /// a shorter timeout through [`HttpRequest::timeout`].
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("setlist-offline/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default reqwest client");
                Client::new()
            });

        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(Self::convert_method(request.method), &request.url);

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

    fn classify(error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Timeout(error.to_string())
        } else if error.is_connect() {
            BridgeError::Offline(error.to_string())
        } else {
            BridgeError::OperationFailed(error.to_string())
        }
    }

    async fn send_once(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        // A connection dropped mid-body fails here rather than yielding a short body.
        let body = response.bytes().await.map_err(Self::classify)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_with_retry_internal(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts = attempts, url = %request.url, "Executing HTTP request");

            let outcome = self.send_once(request.clone()).await;
            let retryable = match &outcome {
                Ok(response) => response.status >= 500 || response.status == 429,
                Err(BridgeError::OperationFailed(_)) => true,
                Err(error) => error.is_transient(),
            };

            if !retryable || attempt >= attempts {
                if let Err(error) = &outcome {
                    warn!(error = %error, attempt, url = %request.url, "HTTP request failed");
                }
                return outcome;
            }

            let delay = policy.delay_for(attempt);
            match &outcome {
                Ok(response) => {
                    warn!(status = response.status, attempt, "Retryable HTTP status")
                }
                Err(error) => warn!(error = %error, attempt, "Retryable HTTP failure"),
            }
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.execute_with_retry_internal(request, policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Get),
            reqwest::Method::GET
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Patch),
            reqwest::Method::PATCH
        );
    }

    #[tokio::test]
    async fn test_refused_connection_is_offline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(2));
        let result = client
            .execute_with_retry(
                HttpRequest::get(format!("http://{}/songs", addr)),
                RetryPolicy::none(),
            )
            .await;

        assert!(matches!(result, Err(BridgeError::Offline(_))));
    }

    #[tokio::test]
    async fn test_headers_and_body_are_collected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: 4\r\nConnection: close\r\n\r\nRIFF",
                )
                .await
                .unwrap();
        });

        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(5));
        let response = client
            .execute_with_retry(
                HttpRequest::get(format!("http://{}/a.mp3", addr)),
                RetryPolicy::none(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_length(), Some(4));
        assert_eq!(response.content_type(), Some("audio/mpeg"));
        assert_eq!(&response.body[..], b"RIFF");
    }
}
