use futures::StreamExt;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

const MAX_REDIRECTS: usize = 5;

/// Errors that prevent a feed body from being downloaded.
///
/// A non-success HTTP status is not an error here; it comes back as
/// [`Download::Status`] so the caller can record it.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },
    /// Received fewer bytes than Content-Length announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Outcome of a completed HTTP exchange.
#[derive(Debug)]
pub enum Download {
    /// 2xx response with its full body
    Body(Vec<u8>),
    /// Any other status; the body is not read
    Status(StatusCode),
}

/// Build the shared HTTP client for feed downloads.
///
/// Bodies are transparently decompressed (gzip, deflate) and every request
/// is bounded by the configured timeout.
pub fn build_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .gzip(true)
        .deflate(true)
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(config.request_timeout())
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following feed redirect"
        );

        attempt.follow()
    })
}

/// Download `uri`, reading at most `limit` bytes of body.
pub async fn download(
    client: &reqwest::Client,
    uri: &str,
    limit: usize,
) -> Result<Download, FetchError> {
    let response = client.get(uri).send().await?;

    let status = response.status();
    if !status.is_success() {
        tracing::debug!(uri = %uri, status = %status, "Feed request returned non-success status");
        return Ok(Download::Status(status));
    }

    let bytes = read_limited_bytes(response, limit).await?;
    tracing::trace!(uri = %uri, bytes = bytes.len(), "Downloaded feed");
    Ok(Download::Body(bytes))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Content-Length is the compressed size when the body is encoded, so the
    // streamed byte count is what the limit is finally enforced on.
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> reqwest::Client {
        build_client(&Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_download_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss/>"))
            .mount(&mock_server)
            .await;

        let result = download(&test_client(), &format!("{}/feed", mock_server.uri()), 1024)
            .await
            .unwrap();
        match result {
            Download::Body(bytes) => assert_eq!(bytes, b"<rss/>"),
            other => panic!("Expected body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "Mozilla/5.0 (Windows)"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = download(&test_client(), &mock_server.uri(), 1024).await.unwrap();
        assert!(matches!(result, Download::Body(_)));
    }

    #[tokio::test]
    async fn test_download_status_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = download(&test_client(), &mock_server.uri(), 1024).await.unwrap();
        match result {
            Download::Status(status) => assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR),
            other => panic!("Expected status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let err = download(&test_client(), &mock_server.uri(), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_download_at_limit_accepted() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1024)))
            .mount(&mock_server)
            .await;

        let result = download(&test_client(), &mock_server.uri(), 1024).await.unwrap();
        assert!(matches!(result, Download::Body(bytes) if bytes.len() == 1024));
    }

    #[tokio::test]
    async fn test_download_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = download(&test_client(), &format!("http://{}/feed", addr), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
