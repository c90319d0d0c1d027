//! Classification of HTTP responses and client errors.

use crate::error::{RetryResult, RetryableError};
use reqwest::Response;

impl From<reqwest::Error> for RetryableError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RetryableError::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            RetryableError::Connection(err.to_string())
        } else {
            RetryableError::Other(err.into())
        }
    }
}

/// Check an HTTP response and convert a non-success status into a
/// [`RetryableError::Http`].
pub async fn check_response(response: Response) -> RetryResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(RetryableError::Http { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Retryable;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_check_response_passes_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
            .mount(&server)
            .await;

        let response = reqwest::get(format!("{}/ok", server.uri())).await.unwrap();
        let response = check_response(response).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn test_check_response_classifies_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let response = reqwest::get(format!("{}/busy", server.uri())).await.unwrap();
        let err = check_response(response).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "HTTP error 503: overloaded");
    }
}
