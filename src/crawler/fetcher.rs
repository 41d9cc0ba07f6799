use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// One GET, raw body out
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// `Fetcher` backed by a shared reqwest client
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::with_settings(&config.user_agent, config.request_timeout)
    }

    pub fn with_settings(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        tracing::trace!(url, "GET");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::Unreachable {
                url: url.to_string(),
                reason: "empty response body".to_string(),
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_identifying_header_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manga/t/"))
            .and(header("user-agent", "test-agent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html>ok</html>".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_settings("test-agent/1.0", Duration::from_secs(5)).unwrap();
        let body = fetcher.fetch(&format!("{}/manga/t/", server.uri())).await.unwrap();
        assert_eq!(&body[..], b"<html>ok</html>");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_settings("ua", Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&format!("{}/img.jpg", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn empty_body_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_settings("ua", Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&format!("{}/img.jpg", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_settings("ua", Duration::from_millis(100)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        match err {
            FetchError::Transport(e) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other}"),
        }
    }
}
