//! The HTTP transport boundary, abstracted behind [`HttpSender`] so the
//! retry/backoff and classification logic can be tested without a real
//! network call.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Response shape the sender needs: just enough to classify the outcome
/// and capture an audit snippet.
#[derive(Debug, Clone)]
pub struct SendResponse {
    pub status: u16,
    pub body_snippet: String,
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum SendTransportError {
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Other(String),
}

pub trait HttpSender: Send + Sync {
    fn post<'a>(
        &'a self,
        file_name: &'a str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SendResponse, SendTransportError>> + Send + 'a>>;
}

/// The real sender, backed by a shared `reqwest::Client`. TLS verification
/// is a client-construction concern (`danger_accept_invalid_certs`), so
/// `verify_ssl` is consumed once when building the client, not per request.
pub struct ReqwestSender {
    client: reqwest::Client,
    remote_host_url: String,
}

impl ReqwestSender {
    pub fn new(remote_host_url: String, verify_ssl: bool) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .build()?;
        Ok(Self {
            client,
            remote_host_url,
        })
    }
}

const RESPONSE_SNIPPET_MAX: usize = 100;

impl HttpSender for ReqwestSender {
    fn post<'a>(
        &'a self,
        file_name: &'a str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SendResponse, SendTransportError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.remote_host_url)
                .header("x-filename", file_name)
                .timeout(timeout)
                .body(body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        SendTransportError::Timeout
                    } else {
                        SendTransportError::Other(e.to_string())
                    }
                })?;

            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let body_snippet: String = text.chars().take(RESPONSE_SNIPPET_MAX).collect();

            Ok(SendResponse { status, body_snippet })
        })
    }
}

/// Classification of a completed attempt, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Terminal,
    Retryable,
}

pub fn classify_status(status: u16) -> AttemptOutcome {
    if (200..300).contains(&status) {
        AttemptOutcome::Success
    } else if status == 408 || status == 429 {
        AttemptOutcome::Retryable
    } else if (400..500).contains(&status) {
        AttemptOutcome::Terminal
    } else {
        // 5xx and any unrecognized status are treated as transient.
        AttemptOutcome::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert_eq!(classify_status(408), AttemptOutcome::Retryable);
        assert_eq!(classify_status(429), AttemptOutcome::Retryable);
        assert_eq!(classify_status(500), AttemptOutcome::Retryable);
        assert_eq!(classify_status(503), AttemptOutcome::Retryable);
    }

    #[test]
    fn terminal_statuses() {
        for status in [400, 401, 403, 404] {
            assert_eq!(classify_status(status), AttemptOutcome::Terminal);
        }
    }

    #[test]
    fn success_statuses() {
        assert_eq!(classify_status(200), AttemptOutcome::Success);
        assert_eq!(classify_status(204), AttemptOutcome::Success);
    }
}
